use itertools::Itertools;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::unionfind::UnionFind;
use petgraph::visit::EdgeRef;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};
use xxhash_rust::xxh3::xxh3_64;

use crate::embed::{embed_checked, Embedder};
use crate::error::{NarrativeError, Result};
use crate::models::{ComponentPosts, PlatformCorpus};
use crate::out_models::SimilarityComponent;
use crate::similarity::cosine_matrix;

pub const PLATFORM_COUNT: usize = 3;
pub const DEFAULT_THRESHOLD: f32 = 0.7;

/// Contiguous block of global node ids owned by one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformRange {
    pub name: String,
    pub offset: usize,
    pub len: usize,
}

impl PlatformRange {
    pub fn contains(&self, node: usize) -> bool {
        self.offset <= node && node < self.offset + self.len
    }
}

/// Undirected cross-platform similarity graph. Node index == global node id;
/// the node weight is the index of the owning platform.
#[derive(Debug, Clone)]
pub struct SimilarityGraph {
    graph: UnGraph<usize, f32>,
    ranges: Vec<PlatformRange>,
}

impl SimilarityGraph {
    fn with_ranges(ranges: Vec<PlatformRange>) -> Self {
        let mut graph = UnGraph::default();
        for (p, r) in ranges.iter().enumerate() {
            for _ in 0..r.len {
                graph.add_node(p);
            }
        }
        Self { graph, ranges }
    }

    pub fn ranges(&self) -> &[PlatformRange] {
        &self.ranges
    }

    pub fn offsets(&self) -> BTreeMap<String, usize> {
        self.ranges.iter().map(|r| (r.name.clone(), r.offset)).collect()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn platform_of(&self, node: usize) -> Option<&PlatformRange> {
        self.ranges.iter().find(|r| r.contains(node))
    }

    /// `(a, b, similarity)` for every admitted edge, `a < b`.
    pub fn edges(&self) -> Vec<(usize, usize, f32)> {
        self.graph
            .edge_references()
            .map(|e| {
                let (a, b) = (e.source().index(), e.target().index());
                (a.min(b), a.max(b), *e.weight())
            })
            .collect()
    }

    /// Node sets of connected components with at least two nodes, each sorted,
    /// ordered by smallest member.
    pub fn components(&self) -> Vec<Vec<usize>> {
        let mut uf = UnionFind::<usize>::new(self.graph.node_count());
        for e in self.graph.edge_references() {
            uf.union(e.source().index(), e.target().index());
        }
        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (node, root) in uf.into_labeling().into_iter().enumerate() {
            groups.entry(root).or_default().push(node);
        }
        let mut comps: Vec<Vec<usize>> = groups.into_values().filter(|c| c.len() > 1).collect();
        comps.sort_by_key(|c| c[0]);
        comps
    }
}

/// Edges for every matrix entry strictly above `threshold`, shifted into global ids.
pub fn edges_from_similarity(
    matrix: &[Vec<f32>],
    offset_a: usize,
    offset_b: usize,
    threshold: f32,
) -> Vec<(usize, usize, f32)> {
    matrix
        .iter()
        .enumerate()
        .flat_map(|(i, row)| {
            row.iter()
                .enumerate()
                .filter(move |&(_, &s)| s > threshold)
                .map(move |(j, &s)| (offset_a + i, offset_b + j, s))
        })
        .collect()
}

/// Exactly [`PLATFORM_COUNT`] platforms, each name used once. Buckets and
/// offsets are keyed by name, so a repeated name would merge two platforms.
pub fn check_platform_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<()> {
    let names: Vec<&str> = names.into_iter().collect();
    if names.len() != PLATFORM_COUNT {
        return Err(NarrativeError::Config(format!(
            "tripartite graph requires exactly {} platforms, got {}",
            PLATFORM_COUNT,
            names.len()
        )));
    }
    if let Some(dup) = names.iter().duplicates().next() {
        return Err(NarrativeError::Config(format!(
            "platform names must be unique, {:?} given more than once",
            dup
        )));
    }
    Ok(())
}

/// Tripartite graph over precomputed embeddings, one embedding set per platform.
pub fn tripartite_from_embeddings(
    platforms: &[(&str, &[Vec<f32>])],
    threshold: f32,
) -> Result<SimilarityGraph> {
    check_platform_names(platforms.iter().map(|(name, _)| *name))?;

    let mut ranges = Vec::with_capacity(platforms.len());
    let mut offset = 0usize;
    for (name, emb) in platforms {
        ranges.push(PlatformRange {
            name: name.to_string(),
            offset,
            len: emb.len(),
        });
        offset += emb.len();
    }

    let mut g = SimilarityGraph::with_ranges(ranges);
    for (i, j) in (0..platforms.len()).tuple_combinations() {
        let (name_a, emb_a) = platforms[i];
        let (name_b, emb_b) = platforms[j];
        debug!("Computing similarity - {} x {} ({}x{})", name_a, name_b, emb_a.len(), emb_b.len());

        let matrix = cosine_matrix(emb_a, emb_b);
        let (off_a, off_b) = (g.ranges[i].offset, g.ranges[j].offset);
        let edges = edges_from_similarity(&matrix, off_a, off_b, threshold);
        debug!("Similarity edges admitted - {} x {}: {}", name_a, name_b, edges.len());
        for (a, b, w) in edges {
            g.graph.add_edge(NodeIndex::new(a), NodeIndex::new(b), w);
        }
    }
    Ok(g)
}

pub struct SimilarityGraphBuilder {
    embedder: Arc<dyn Embedder>,
    threshold: f32,
    batch_size: usize,
    show_progress: bool,
}

impl SimilarityGraphBuilder {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        threshold: f32,
        batch_size: usize,
        show_progress: bool,
    ) -> Self {
        Self {
            embedder,
            threshold,
            batch_size,
            show_progress,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub async fn build_tripartite_graph(
        &self,
        corpora: &[PlatformCorpus],
    ) -> Result<SimilarityGraph> {
        check_platform_names(corpora.iter().map(|c| c.name.as_str()))?;
        let start = std::time::Instant::now();

        let mut embeddings = Vec::with_capacity(corpora.len());
        for c in corpora {
            info!("Encoding posts - platform={}, posts={}", c.name, c.posts.len());
            let texts: Vec<String> = c.posts.iter().map(|p| p.post.clone()).collect();
            let vectors =
                embed_checked(self.embedder.as_ref(), &texts, self.batch_size, self.show_progress)
                    .await?;
            embeddings.push(vectors);
        }

        let platforms: Vec<(&str, &[Vec<f32>])> = corpora
            .iter()
            .zip(&embeddings)
            .map(|(c, e)| (c.name.as_str(), e.as_slice()))
            .collect();
        let g = tripartite_from_embeddings(&platforms, self.threshold)?;

        info!(
            "Similarity graph completed - nodes={}, edges={}, threshold={}, duration={:.2}s",
            g.node_count(),
            g.edge_count(),
            self.threshold,
            start.elapsed().as_secs_f32()
        );
        Ok(g)
    }
}

/// Map every multi-node component back to the posts it came from, bucketed by platform.
pub fn extract_connected_components(
    graph: &SimilarityGraph,
    corpora: &[PlatformCorpus],
) -> Result<Vec<SimilarityComponent>> {
    check_platform_names(corpora.iter().map(|c| c.name.as_str()))?;
    let consistent = corpora.len() == graph.ranges.len()
        && corpora
            .iter()
            .zip(&graph.ranges)
            .all(|(c, r)| c.name == r.name && c.posts.len() == r.len);
    if !consistent {
        return Err(NarrativeError::Config(
            "platform corpora do not match the similarity graph layout".into(),
        ));
    }

    let names: Vec<&str> = corpora.iter().map(|c| c.name.as_str()).collect();
    let mut out = Vec::new();
    for nodes in graph.components() {
        let mut posts = ComponentPosts::with_platforms(names.iter().copied());
        let mut key = String::new();
        for &node in &nodes {
            if let Some((p, r)) = graph.ranges.iter().enumerate().find(|(_, r)| r.contains(node)) {
                let post = &corpora[p].posts[node - r.offset];
                key.push_str(&format!("{}:{}|", r.name, post.id));
                posts.push(&r.name, post.clone());
            }
        }
        out.push(SimilarityComponent {
            component_id: format!("{:016x}", xxh3_64(key.as_bytes())),
            node_count: nodes.len(),
            posts,
        });
    }

    let sizes: Vec<usize> = out.iter().map(|c| c.node_count).collect();
    if let (Some(min), Some(max)) = (sizes.iter().min(), sizes.iter().max()) {
        debug!("Component size distribution - count={}, min={}, max={}", sizes.len(), min, max);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::testing::FixedEmbedder;
    use crate::models::Post;

    fn corpus(name: &str, texts: &[&str]) -> PlatformCorpus {
        PlatformCorpus::new(
            name,
            texts
                .iter()
                .enumerate()
                .map(|(i, t)| Post::new(format!("{name}{i}"), *t).with_platform(name))
                .collect(),
        )
    }

    fn same_range(g: &SimilarityGraph, a: usize, b: usize) -> bool {
        g.ranges().iter().any(|r| r.contains(a) && r.contains(b))
    }

    #[tokio::test]
    async fn offsets_partition_nodes_and_edges_cross_platforms() {
        let embedder = FixedEmbedder::new(&[], vec![1.0, 1.0]);
        let builder = SimilarityGraphBuilder::new(Arc::new(embedder), DEFAULT_THRESHOLD, 64, false);
        let corpora = vec![
            corpus("truth", &["a", "b", "c"]),
            corpus("bluesky", &["d", "e", "f", "g"]),
            corpus("mastodon", &["h", "i", "j", "k", "l"]),
        ];
        let g = builder.build_tripartite_graph(&corpora).await.unwrap();

        let spans: Vec<(usize, usize)> =
            g.ranges().iter().map(|r| (r.offset, r.offset + r.len)).collect();
        assert_eq!(spans, vec![(0, 3), (3, 7), (7, 12)]);
        assert_eq!(g.node_count(), 12);
        assert_eq!(g.edge_count(), 3 * 4 + 3 * 5 + 4 * 5);
        assert!(g.edges().iter().all(|&(a, b, _)| !same_range(&g, a, b)));
        assert_eq!(g.offsets()["mastodon"], 7);
    }

    #[tokio::test]
    async fn wrong_platform_count_is_a_config_error() {
        let builder = SimilarityGraphBuilder::new(
            Arc::new(FixedEmbedder::new(&[], vec![1.0])),
            DEFAULT_THRESHOLD,
            64,
            false,
        );
        let err = builder
            .build_tripartite_graph(&[corpus("a", &["x"]), corpus("b", &["y"])])
            .await
            .unwrap_err();
        assert!(matches!(err, NarrativeError::Config(_)));
    }

    #[tokio::test]
    async fn repeated_platform_names_are_a_config_error() {
        let embedder = Arc::new(FixedEmbedder::new(&[], vec![1.0]));
        let builder = SimilarityGraphBuilder::new(embedder.clone(), 0.5, 64, false);
        let corpora = vec![corpus("a", &["x"]), corpus("a", &["y"]), corpus("b", &["z"])];
        let err = builder.build_tripartite_graph(&corpora).await.unwrap_err();
        assert!(matches!(err, NarrativeError::Config(ref m) if m.contains("\"a\"")));
        assert_eq!(embedder.call_count(), 0);

        let one = vec![vec![1.0]];
        let err = tripartite_from_embeddings(
            &[("a", one.as_slice()), ("a", one.as_slice()), ("b", one.as_slice())],
            0.5,
        )
        .unwrap_err();
        assert!(matches!(err, NarrativeError::Config(_)));

        let g = tripartite_from_embeddings(
            &[("a", one.as_slice()), ("c", one.as_slice()), ("b", one.as_slice())],
            0.5,
        )
        .unwrap();
        assert!(extract_connected_components(&g, &corpora).is_err());
    }

    #[test]
    fn threshold_is_strictly_greater_than() {
        let matrix = vec![vec![0.7, 0.71], vec![0.69, 1.0]];
        let edges = edges_from_similarity(&matrix, 0, 10, 0.7);
        assert_eq!(edges, vec![(0, 11, 0.71), (1, 11, 1.0)]);
    }

    #[test]
    fn singletons_are_dropped_and_posts_are_recovered() {
        let truth = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let bluesky = vec![vec![1.0, 0.05]];
        let mastodon = vec![vec![-1.0, 0.0], vec![0.99, 0.0]];
        let g = tripartite_from_embeddings(
            &[
                ("truth", truth.as_slice()),
                ("bluesky", bluesky.as_slice()),
                ("mastodon", mastodon.as_slice()),
            ],
            0.7,
        )
        .unwrap();

        let corpora = vec![
            corpus("truth", &["t0", "t1"]),
            corpus("bluesky", &["b0"]),
            corpus("mastodon", &["m0", "m1"]),
        ];
        let comps = extract_connected_components(&g, &corpora).unwrap();
        assert_eq!(comps.len(), 1);
        let c = &comps[0];
        assert_eq!(c.node_count, 3);
        assert!(comps.iter().all(|c| c.node_count >= 2));

        let ids = |p: &str| -> Vec<String> {
            c.posts.get(p).unwrap().iter().map(|p| p.id.to_string()).collect()
        };
        assert_eq!(ids("truth"), vec!["truth0"]);
        assert_eq!(ids("bluesky"), vec!["bluesky0"]);
        assert_eq!(ids("mastodon"), vec!["mastodon1"]);
        assert_eq!(c.component_id.len(), 16);
    }

    #[test]
    fn mismatched_corpora_are_rejected() {
        let one = vec![vec![1.0]];
        let g = tripartite_from_embeddings(
            &[("a", one.as_slice()), ("b", one.as_slice()), ("c", one.as_slice())],
            0.5,
        )
        .unwrap();
        let corpora = vec![corpus("a", &["x"]), corpus("b", &["y", "z"]), corpus("c", &["w"])];
        assert!(extract_connected_components(&g, &corpora).is_err());
    }

    #[test]
    fn empty_platform_gets_an_empty_bucket() {
        let v = vec![vec![1.0, 0.0]];
        let none: Vec<Vec<f32>> = Vec::new();
        let g = tripartite_from_embeddings(
            &[("a", v.as_slice()), ("b", none.as_slice()), ("c", v.as_slice())],
            0.5,
        )
        .unwrap();
        let corpora = vec![corpus("a", &["x"]), corpus("b", &[]), corpus("c", &["y"])];
        let comps = extract_connected_components(&g, &corpora).unwrap();
        assert_eq!(comps.len(), 1);
        assert_eq!(comps[0].posts.get("b").map(|p| p.len()), Some(0));
        assert_eq!(g.ranges()[2].offset, 1);
    }
}
