use async_trait::async_trait;
use petgraph::algo::{dijkstra, toposort};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{GraphError, NarrativeError, Result};
use crate::models::{Post, PostId};
use crate::out_models::{FieldSummary, NarrativeSummary, RootTreeStats, TreeNarratives, TreeStats};
use crate::post_graph::{posts_from_trees, PostGraph};

pub const DEFAULT_BATCH_SIZE: usize = 8;

/// Discourse-analysis function applied to every post of the requested trees.
#[async_trait]
pub trait PostAnalyzer: Send + Sync {
    async fn analyze(&self, post: &Post) -> Result<Value>;
}

/// Adapts a plain closure into a [`PostAnalyzer`].
pub struct FnAnalyzer<F>(pub F);

#[async_trait]
impl<F> PostAnalyzer for FnAnalyzer<F>
where
    F: Fn(&Post) -> Value + Send + Sync,
{
    async fn analyze(&self, post: &Post) -> Result<Value> {
        Ok((self.0)(post))
    }
}

pub fn tree_statistics(
    graph: &PostGraph,
    root: &PostId,
) -> std::result::Result<TreeStats, GraphError> {
    let nodes = graph.tree_nodes(root);
    let tree = graph.induced_subgraph(&nodes);

    // The root always exists, even when it is missing from the graph.
    if tree.edge_count() == 0 {
        return Ok(TreeStats {
            depth: 0,
            breadth: 0,
            num_nodes: 1,
        });
    }

    let order = toposort(&tree, None).map_err(|_| GraphError::Cycle { root: root.clone() })?;
    let mut longest: HashMap<_, usize> = HashMap::with_capacity(order.len());
    let mut depth = 0usize;
    for &n in &order {
        let here = longest.get(&n).copied().unwrap_or(0);
        depth = depth.max(here);
        for succ in tree.neighbors(n) {
            let e = longest.entry(succ).or_insert(0);
            *e = (*e).max(here + 1);
        }
    }

    // Unreachable while edge_count > 0: every edge hangs off the root's tree.
    let root_ix = tree
        .node_indices()
        .find(|&ix| tree[ix] == *root)
        .ok_or_else(|| GraphError::MissingRoot { root: root.clone() })?;
    let levels = dijkstra(&tree, root_ix, None, |_| 1usize);
    let mut level_counts: BTreeMap<usize, usize> = BTreeMap::new();
    for lvl in levels.values() {
        *level_counts.entry(*lvl).or_insert(0) += 1;
    }
    let breadth = level_counts.values().copied().max().unwrap_or(0);

    Ok(TreeStats {
        depth,
        breadth,
        num_nodes: tree.node_count(),
    })
}

/// Per-tree statistics plus batch discourse analysis over conversation trees.
pub struct NarrativeTreeAnalyzer {
    analyzer: Option<Arc<dyn PostAnalyzer>>,
}

impl NarrativeTreeAnalyzer {
    pub fn new(analyzer: Option<Arc<dyn PostAnalyzer>>) -> Self {
        Self { analyzer }
    }

    pub fn extract_tree_statistics(&self, graph: &PostGraph, root: &PostId) -> Result<TreeStats> {
        Ok(tree_statistics(graph, root)?)
    }

    pub fn extract_posts_from_trees(
        &self,
        graph: &PostGraph,
        anchor_ids: &[PostId],
        lookup: &HashMap<PostId, Post>,
    ) -> Vec<Post> {
        posts_from_trees(graph, anchor_ids, lookup)
    }

    /// Runs the analyzer over `posts` in consecutive batches, one result per post
    /// in input order. `analyzer` overrides the one set at construction.
    pub async fn analyze_discourse(
        &self,
        posts: &[Post],
        analyzer: Option<&dyn PostAnalyzer>,
        batch_size: usize,
    ) -> Result<Vec<Value>> {
        let analyzer: &dyn PostAnalyzer = match analyzer {
            Some(a) => a,
            None => self.analyzer.as_deref().ok_or_else(|| {
                NarrativeError::Config(
                    "no analyzer function provided and none set at construction".into(),
                )
            })?,
        };
        if batch_size == 0 {
            return Err(NarrativeError::Config("batch_size must be positive".into()));
        }

        let total = posts.len();
        let mut results = Vec::with_capacity(total);
        for (batch, chunk) in posts.chunks(batch_size).enumerate() {
            let start = batch * batch_size;
            for post in chunk {
                let value = analyzer.analyze(post).await.map_err(|e| NarrativeError::Analyzer {
                    batch,
                    start,
                    end: start + chunk.len(),
                    message: e.to_string(),
                })?;
                results.push(value);
            }
            debug!("Discourse progress - analyzed={}/{}", results.len(), total);
        }
        Ok(results)
    }

    pub async fn analyze_tree_narratives(
        &self,
        graph: &PostGraph,
        root_ids: &[PostId],
        lookup: &HashMap<PostId, Post>,
        analyzer: Option<&dyn PostAnalyzer>,
        batch_size: usize,
    ) -> Result<TreeNarratives> {
        let start = std::time::Instant::now();
        let posts = self.extract_posts_from_trees(graph, root_ids, lookup);

        let mut tree_stats = Vec::with_capacity(root_ids.len());
        for root in root_ids {
            tree_stats.push(RootTreeStats {
                root: root.clone(),
                stats: self.extract_tree_statistics(graph, root)?,
            });
        }

        let analysis_results = self.analyze_discourse(&posts, analyzer, batch_size).await?;

        info!(
            "Tree narrative analysis completed - roots={}, posts={}, duration={:.2}s",
            root_ids.len(),
            posts.len(),
            start.elapsed().as_secs_f32()
        );
        Ok(TreeNarratives {
            posts,
            tree_stats,
            analysis_results,
        })
    }
}

enum Accum {
    Numeric(Vec<f64>),
    Categorical(BTreeMap<String, usize>),
    Unsupported,
}

/// Aggregate analysis mappings key by key. The first value seen for a key fixes
/// its kind; later values of another kind are skipped. Keys whose first value is
/// neither a number nor a string are left out, as are non-object results.
pub fn narrative_summary(results: &[Value]) -> NarrativeSummary {
    let mut acc: BTreeMap<String, Accum> = BTreeMap::new();
    let mut skipped: BTreeMap<String, usize> = BTreeMap::new();

    for obj in results.iter().filter_map(Value::as_object) {
        for (key, value) in obj {
            let slot = acc.entry(key.clone()).or_insert_with(|| match value {
                Value::Number(_) => Accum::Numeric(Vec::new()),
                Value::String(_) => Accum::Categorical(BTreeMap::new()),
                _ => Accum::Unsupported,
            });
            match (slot, value) {
                (Accum::Numeric(xs), Value::Number(n)) => {
                    if let Some(x) = n.as_f64() {
                        xs.push(x);
                    }
                }
                (Accum::Categorical(counts), Value::String(s)) => {
                    *counts.entry(s.clone()).or_insert(0) += 1;
                }
                (Accum::Unsupported, _) => {}
                _ => *skipped.entry(key.clone()).or_insert(0) += 1,
            }
        }
    }

    for (key, n) in &skipped {
        debug!("Summary skipped mixed-type values - key={}, skipped={}", key, n);
    }

    acc.into_iter()
        .filter_map(|(key, a)| match a {
            Accum::Numeric(xs) if !xs.is_empty() => {
                let count = xs.len();
                let sum: f64 = xs.iter().sum();
                let min = xs.iter().copied().fold(f64::INFINITY, f64::min);
                let max = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                Some((key, FieldSummary::Numeric { mean: sum / count as f64, min, max, count }))
            }
            Accum::Categorical(counts) => Some((key, FieldSummary::Categorical(counts))),
            _ => None,
        })
        .collect()
}
