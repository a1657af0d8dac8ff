// src/render.rs
use crate::models::RankedPost;
use crate::out_models::{
    Classification, ComponentClassification, FieldSummary, RootReplyChainResult, RunSummary,
    SimilarityComponent, TreeNarratives,
};

/// Everything the Markdown report draws from.
pub struct Report<'a> {
    pub summary: &'a RunSummary,
    pub ranked: &'a [(String, Vec<RankedPost>)],
    pub components: &'a [SimilarityComponent],
    pub classifications: &'a [ComponentClassification],
    pub trees: &'a TreeNarratives,
    pub reply_chains: &'a [RootReplyChainResult],
}

const TOP_POSTS: usize = 5;
const SNIPPET_CHARS: usize = 140;

fn snippet(text: &str) -> String {
    let one_line = text.replace('\n', " ");
    if one_line.chars().count() <= SNIPPET_CHARS {
        return one_line;
    }
    let cut: String = one_line.chars().take(SNIPPET_CHARS).collect();
    format!("{}…", cut.trim_end())
}

pub fn render_classification(c: &Classification) -> String {
    match c {
        Classification::Structured(serde_json::Value::Object(map)) => map
            .iter()
            .map(|(k, v)| match v {
                serde_json::Value::String(s) => format!("{}: {}", k, s),
                other => format!("{}: {}", k, other),
            })
            .collect::<Vec<_>>()
            .join("; "),
        Classification::Structured(other) => other.to_string(),
        Classification::Raw { raw_response } => format!("(unparsed) {}", snippet(raw_response)),
    }
}

pub fn render_report_markdown(r: &Report<'_>) -> String {
    let s = r.summary;
    let mut md = String::new();
    md.push_str("# Narrative Propagation Report\n\n");
    md.push_str(&format!("_Generated {}_\n\n", s.generated_at));

    md.push_str("## Platforms\n");
    for p in &s.platforms {
        md.push_str(&format!("- **{}**: {} posts\n", p.platform, p.posts));
    }
    md.push('\n');

    if r.ranked.iter().any(|(_, posts)| !posts.is_empty()) {
        md.push_str("## Most Central Posts\n");
        for (platform, posts) in r.ranked {
            if posts.is_empty() {
                continue;
            }
            md.push_str(&format!("### {}\n", platform));
            for p in posts.iter().take(TOP_POSTS) {
                md.push_str(&format!("- `{:.3}` {}\n", p.score, snippet(&p.post.post)));
            }
            md.push('\n');
        }
    }

    md.push_str("## Cross-Platform Similarity\n");
    md.push_str(&format!(
        "{} nodes, {} edges, {} multi-post components.\n\n",
        s.similarity_nodes, s.similarity_edges, s.components
    ));
    for (c, cls) in r.components.iter().zip(r.classifications) {
        md.push_str(&format!("### Component {} ({} posts)\n", c.component_id, c.node_count));
        for (platform, posts) in c.posts.iter() {
            if posts.is_empty() {
                continue;
            }
            md.push_str(&format!(
                "- **{}** ({}): {}\n",
                platform,
                posts.len(),
                snippet(&posts[0].post)
            ));
        }
        for pc in &cls.platforms {
            md.push_str(&format!(
                "  - _{}_ → {}\n",
                pc.platform,
                render_classification(&pc.classification)
            ));
        }
        md.push('\n');
    }

    if !r.trees.tree_stats.is_empty() {
        md.push_str("## Conversation Trees\n");
        md.push_str("| root | depth | breadth | nodes |\n|---|---|---|---|\n");
        for t in &r.trees.tree_stats {
            md.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                t.root, t.stats.depth, t.stats.breadth, t.stats.num_nodes
            ));
        }
        md.push('\n');
    }

    if !s.narrative.is_empty() {
        md.push_str("## Narrative Summary\n");
        for (key, field) in &s.narrative {
            match field {
                FieldSummary::Numeric { mean, min, max, count } => md.push_str(&format!(
                    "- **{}**: mean {:.2} (min {:.2}, max {:.2}, n={})\n",
                    key, mean, min, max, count
                )),
                FieldSummary::Categorical(counts) => {
                    let mut top: Vec<_> = counts.iter().collect();
                    top.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
                    let shown = top
                        .iter()
                        .take(5)
                        .map(|(v, n)| format!("{} ({})", v, n))
                        .collect::<Vec<_>>()
                        .join(", ");
                    md.push_str(&format!("- **{}**: {}\n", key, shown));
                }
            }
        }
        md.push('\n');
    }

    md.push_str("## Reply Dynamics\n");
    if s.dynamics.total_analyzed == 0 {
        md.push_str("No reply chains analyzed.\n");
    } else {
        md.push_str(&format!("{} reply chains analyzed.\n\n", s.dynamics.total_analyzed));
        for (cat, n) in &s.dynamics.counts {
            let pct = s.dynamics.percentages.get(cat).copied().unwrap_or(0.0);
            md.push_str(&format!("- {}: {} ({:.2}%)\n", cat, n, pct));
        }
        let unknown = r
            .reply_chains
            .iter()
            .filter(|c| c.result.category == crate::out_models::ReplyCategory::Unknown)
            .count();
        if unknown > 0 {
            md.push_str(&format!("\n{} chains returned an unrecognised label.\n", unknown));
        }
    }

    md
}
