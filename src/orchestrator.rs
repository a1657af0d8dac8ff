use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::classify::{narrative_dynamics_summary, NarrativeClassifier, ReplyChainAnalyzer};
use crate::config::Config;
use crate::embed::{Embedder, HttpEmbedder};
use crate::ingest::{id_to_post_map, prepare_platform};
use crate::models::{PlatformCorpus, Post, PostId, RankedPost};
use crate::narrative_tree::{narrative_summary, NarrativeTreeAnalyzer, PostAnalyzer};
use crate::oracle::{CallPolicy, HttpOracle, Oracle};
use crate::out_models::{PlatformCount, ReplyChain, RootReplyChainResult, RunSummary};
use crate::post_graph::PostGraph;
use crate::ranking::{anchor_ids, FastLexRank};
use crate::render::{render_report_markdown, Report};
use crate::similarity_graph::{
    check_platform_names, extract_connected_components, SimilarityGraphBuilder, PLATFORM_COUNT,
};
use crate::text::WhatlangDetector;
use crate::viz_export::write_all_viz;

/// One reply chain per anchor that has at least one reply; replies in tree order.
pub fn reply_chains_for(
    graph: &PostGraph,
    anchors: &[PostId],
    lookup: &HashMap<PostId, Post>,
) -> Vec<ReplyChain> {
    anchors
        .iter()
        .filter_map(|root| {
            let root_post = lookup.get(root)?;
            let replies: Vec<String> = graph
                .tree_walk(root)
                .iter()
                .skip(1)
                .filter_map(|id| lookup.get(id).map(|p| p.post.clone()))
                .collect();
            if replies.is_empty() {
                return None;
            }
            Some(ReplyChain {
                root_id: root.clone(),
                root_post: root_post.post.clone(),
                replies,
            })
        })
        .collect()
}

fn write_json<T: serde::Serialize + ?Sized>(dir: &Path, name: &str, value: &T) -> Result<()> {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_vec_pretty(value)?)
        .with_context(|| format!("write {}", path.display()))?;
    debug!("Wrote {}", name);
    Ok(())
}

pub async fn run_pipeline(
    cfg: &Config,
    platforms: &[(String, PathBuf)],
    output_dir: &str,
) -> Result<()> {
    let pipeline_start = std::time::Instant::now();
    if platforms.len() != PLATFORM_COUNT {
        bail!(
            "exactly {} platforms are required (got {}); pass --platform NAME=PATH three times",
            PLATFORM_COUNT,
            platforms.len()
        );
    }
    check_platform_names(platforms.iter().map(|(n, _)| n.as_str()))
        .context("each --platform NAME must be distinct")?;
    info!(
        "Pipeline started - platforms={}",
        platforms.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>().join(",")
    );

    // 1) load, clean, language filter
    let load_start = std::time::Instant::now();
    let detector = WhatlangDetector;
    let mut corpora = Vec::with_capacity(platforms.len());
    for (name, path) in platforms {
        let posts = prepare_platform(path, name, &detector, &cfg.analysis.language)
            .with_context(|| format!("loading platform {} from {}", name, path.display()))?;
        corpora.push(PlatformCorpus::new(name.clone(), posts));
    }
    info!(
        "Ingestion completed - duration={:.2}s, posts={}",
        load_start.elapsed().as_secs_f32(),
        corpora.iter().map(|c| c.posts.len()).sum::<usize>()
    );

    let policy = CallPolicy {
        timeout: Duration::from_secs(cfg.request_timeout_secs),
        max_retries: cfg.max_retries,
        ..CallPolicy::default()
    };
    let embedder: Arc<dyn Embedder> = Arc::new(
        HttpEmbedder::new(
            cfg.embedding_api_base(),
            cfg.embedding_api_key(),
            &cfg.embedding.model,
            policy,
        )
        .context("building embedding client")?,
    );
    let oracle: Arc<dyn Oracle> = Arc::new(
        HttpOracle::new(&cfg.api_base, &cfg.api_key, &cfg.model, policy)
            .context("building oracle client")?,
    );

    // 2) centrality ranking per platform
    let rank_start = std::time::Instant::now();
    let ranker = FastLexRank::new(
        embedder.clone(),
        cfg.embedding.batch_size,
        cfg.embedding.show_progress,
    );
    let mut ranked: Vec<(String, Vec<RankedPost>)> = Vec::with_capacity(corpora.len());
    for c in &corpora {
        let r = ranker
            .rank(&c.posts)
            .await
            .with_context(|| format!("ranking {}", c.name))?;
        ranked.push((c.name.clone(), r));
    }
    info!("Ranking completed - duration={:.2}s", rank_start.elapsed().as_secs_f32());

    // 3) cross-platform similarity graph
    let builder = SimilarityGraphBuilder::new(
        embedder.clone(),
        cfg.analysis.similarity_threshold,
        cfg.embedding.batch_size,
        cfg.embedding.show_progress,
    );
    let sim_graph = builder
        .build_tripartite_graph(&corpora)
        .await
        .context("building similarity graph")?;
    let components = extract_connected_components(&sim_graph, &corpora)?;
    info!(
        "Component extraction completed - threshold={}, edges={}, components={}, posts={}",
        builder.threshold(),
        sim_graph.edge_count(),
        components.len(),
        components.iter().map(|c| c.posts.total_posts()).sum::<usize>()
    );

    // 4) component classification
    let classifier = Arc::new(NarrativeClassifier::new(
        oracle.clone(),
        cfg.max_tokens,
        policy.ceiling(),
    ));
    let classifications = classifier
        .batch_classify_components(&components, cfg.analysis.max_posts_per_platform)
        .await
        .context("classifying components")?;

    // 5) reply trees over all posts
    let tree_start = std::time::Instant::now();
    let all_posts: Vec<Post> = corpora.iter().flat_map(|c| c.posts.iter().cloned()).collect();
    let post_graph = PostGraph::build(&all_posts);
    let lookup = id_to_post_map(&all_posts);
    let anchors: Vec<PostId> = ranked
        .iter()
        .flat_map(|(_, r)| anchor_ids(r, cfg.analysis.anchors_per_platform))
        .collect();
    debug!(
        "Post graph built - nodes={}, edges={}, anchors={}",
        post_graph.node_count(),
        post_graph.edge_count(),
        anchors.len()
    );

    let analyzer: Arc<dyn PostAnalyzer> = classifier.clone();
    let tree_analyzer = NarrativeTreeAnalyzer::new(Some(analyzer));
    let trees = tree_analyzer
        .analyze_tree_narratives(&post_graph, &anchors, &lookup, None, cfg.analysis.batch_size)
        .await
        .context("analyzing reply trees")?;
    info!(
        "Tree analysis completed - duration={:.2}s, trees={}, posts={}",
        tree_start.elapsed().as_secs_f32(),
        trees.tree_stats.len(),
        trees.posts.len()
    );

    // 6) reply-chain dynamics
    let chains = reply_chains_for(&post_graph, &anchors, &lookup);
    if chains.is_empty() {
        warn!("No anchor has replies - reply chain analysis skipped");
    }
    let chain_analyzer = ReplyChainAnalyzer::new(oracle.clone(), cfg.max_tokens, policy.ceiling());
    let chain_results = chain_analyzer
        .batch_analyze_reply_chains(&chains, cfg.analysis.batch_size)
        .await
        .context("analyzing reply chains")?;
    let dynamics = narrative_dynamics_summary(&chain_results);
    let reply_chains: Vec<RootReplyChainResult> = chains
        .iter()
        .zip(chain_results)
        .map(|(c, result)| RootReplyChainResult {
            root_id: c.root_id.clone(),
            replies: c.replies.len(),
            result,
        })
        .collect();

    // 7) summaries
    let now = Utc::now();
    let summary = RunSummary {
        generated_at: now.to_rfc3339(),
        platforms: corpora
            .iter()
            .map(|c| PlatformCount {
                platform: c.name.clone(),
                posts: c.posts.len(),
            })
            .collect(),
        similarity_nodes: sim_graph.node_count(),
        similarity_edges: sim_graph.edge_count(),
        components: components.len(),
        narrative: narrative_summary(&trees.analysis_results),
        dynamics,
    };

    // 8) persist to date-scoped directory
    let persist_start = std::time::Instant::now();
    let date = now.format("%Y-%m-%d").to_string();
    let date_dir = Path::new(output_dir).join(&date);
    std::fs::create_dir_all(&date_dir).with_context(|| format!("create {}", date_dir.display()))?;
    debug!("Output directory: {}", date_dir.display());

    write_json(&date_dir, "components.json", &components)?;
    write_json(&date_dir, "classifications.json", &classifications)?;
    write_json(&date_dir, "trees.json", &trees)?;
    write_json(&date_dir, "reply_chains.json", &reply_chains)?;
    write_json(&date_dir, "summary.json", &summary)?;

    let report = render_report_markdown(&Report {
        summary: &summary,
        ranked: &ranked,
        components: &components,
        classifications: &classifications,
        trees: &trees,
        reply_chains: &reply_chains,
    });
    std::fs::write(date_dir.join("report.md"), report.as_bytes()).context("write report.md")?;
    debug!("Wrote report.md");

    write_all_viz(
        &date_dir,
        &date,
        &sim_graph,
        &corpora,
        &components,
        &post_graph,
        &anchors,
        &lookup,
    )?;
    debug!("Wrote viz bundle");

    info!(
        "Output persisted - duration={:.2}s, directory={}",
        persist_start.elapsed().as_secs_f32(),
        date_dir.display()
    );
    info!(
        "Pipeline completed successfully - total_duration={:.2}s, components={}, trees={}, \
         chains={}",
        pipeline_start.elapsed().as_secs_f32(),
        components.len(),
        trees.tree_stats.len(),
        reply_chains.len()
    );
    Ok(())
}
