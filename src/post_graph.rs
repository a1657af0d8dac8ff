use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

use crate::models::{Post, PostId};

/// Reply structure: an edge parent -> child for every post that names a parent
/// other than itself. When the same id appears more than once, the last record
/// decides its parent.
#[derive(Debug, Clone, Default)]
pub struct PostGraph {
    graph: DiGraph<PostId, ()>,
    index: HashMap<PostId, NodeIndex>,
}

impl PostGraph {
    pub fn build(posts: &[Post]) -> Self {
        let mut order: Vec<&PostId> = Vec::with_capacity(posts.len());
        let mut parent_of: HashMap<&PostId, Option<&PostId>> = HashMap::with_capacity(posts.len());
        for p in posts {
            if p.id.is_empty() {
                continue;
            }
            if parent_of.insert(&p.id, p.effective_parent()).is_none() {
                order.push(&p.id);
            }
        }

        let mut g = PostGraph::default();
        for child in order {
            let c = g.ensure_node(child);
            if let Some(parent) = parent_of[child] {
                let p = g.ensure_node(parent);
                g.graph.add_edge(p, c, ());
            }
        }

        debug!(
            "Post graph built - posts={}, nodes={}, edges={}",
            posts.len(),
            g.node_count(),
            g.edge_count()
        );
        g
    }

    fn ensure_node(&mut self, id: &PostId) -> NodeIndex {
        if let Some(&ix) = self.index.get(id) {
            return ix;
        }
        let ix = self.graph.add_node(id.clone());
        self.index.insert(id.clone(), ix);
        ix
    }

    #[cfg(test)]
    pub fn contains(&self, id: &PostId) -> bool {
        self.index.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn parent(&self, id: &PostId) -> Option<&PostId> {
        let ix = *self.index.get(id)?;
        self.graph
            .neighbors_directed(ix, Direction::Incoming)
            .next()
            .map(|p| &self.graph[p])
    }

    pub fn children(&self, id: &PostId) -> Vec<&PostId> {
        let Some(&ix) = self.index.get(id) else {
            return Vec::new();
        };
        let mut out: Vec<&PostId> = self
            .graph
            .neighbors_directed(ix, Direction::Outgoing)
            .map(|c| &self.graph[c])
            .collect();
        out.sort();
        out
    }

    /// Everything reachable from `id`, root first, in breadth-first order.
    pub fn tree_walk(&self, id: &PostId) -> Vec<PostId> {
        let Some(&start) = self.index.get(id) else {
            return vec![id.clone()];
        };
        let mut bfs = Bfs::new(&self.graph, start);
        let mut out = Vec::new();
        while let Some(ix) = bfs.next(&self.graph) {
            out.push(self.graph[ix].clone());
        }
        out
    }

    /// All nodes reachable from `id` through reply edges, excluding `id` itself.
    pub fn descendants(&self, id: &PostId) -> BTreeSet<PostId> {
        let Some(&start) = self.index.get(id) else {
            return BTreeSet::new();
        };
        let mut out = BTreeSet::new();
        let mut bfs = Bfs::new(&self.graph, start);
        while let Some(ix) = bfs.next(&self.graph) {
            if ix != start {
                out.insert(self.graph[ix].clone());
            }
        }
        out
    }

    /// `{id}` plus its descendants; always contains `id`.
    pub fn tree_nodes(&self, id: &PostId) -> BTreeSet<PostId> {
        let mut nodes = self.descendants(id);
        nodes.insert(id.clone());
        nodes
    }

    /// Node-induced subgraph over `nodes`. Ids absent from the graph are ignored.
    pub(crate) fn induced_subgraph(&self, nodes: &BTreeSet<PostId>) -> DiGraph<PostId, ()> {
        let keep: HashSet<NodeIndex> =
            nodes.iter().filter_map(|id| self.index.get(id).copied()).collect();
        self.graph.filter_map(
            |ix, id| keep.contains(&ix).then(|| id.clone()),
            |_, _| Some(()),
        )
    }
}

/// Posts of every tree rooted at `root_ids`, concatenated in root order. A post
/// reachable from several roots appears once per tree; ids with no post in
/// `lookup` are skipped.
pub fn posts_from_trees(
    graph: &PostGraph,
    root_ids: &[PostId],
    lookup: &HashMap<PostId, Post>,
) -> Vec<Post> {
    let mut out = Vec::new();
    let mut missing = 0usize;
    for root in root_ids {
        for id in graph.tree_walk(root) {
            match lookup.get(&id) {
                Some(p) => out.push(p.clone()),
                None => missing += 1,
            }
        }
    }
    if missing > 0 {
        debug!("Tree extraction - skipped={} ids without a post", missing);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::id_to_post_map;

    fn conversation() -> Vec<Post> {
        vec![
            Post::new("root1", "root"),
            Post::new("reply1", "r1").with_parent("root1"),
            Post::new("reply2", "r2").with_parent("root1"),
            Post::new("reply3", "r3").with_parent("reply1"),
            Post::new("lonely", "alone"),
            Post::new("selfie", "me").with_parent("selfie"),
        ]
    }

    fn id(s: &str) -> PostId {
        PostId::from(s)
    }

    #[test]
    fn parentless_and_self_parented_posts_have_no_incoming_edge() {
        let g = PostGraph::build(&conversation());
        for s in ["root1", "lonely", "selfie"] {
            assert!(g.contains(&id(s)));
            assert!(g.parent(&id(s)).is_none());
        }
        assert_eq!(g.edge_count(), 3);
        assert_eq!(g.node_count(), 6);
    }

    #[test]
    fn descendants_and_tree_nodes() {
        let g = PostGraph::build(&conversation());
        let d = g.descendants(&id("root1"));
        assert_eq!(d, [id("reply1"), id("reply2"), id("reply3")].into_iter().collect());
        assert!(g.descendants(&id("nope")).is_empty());
        assert_eq!(g.tree_nodes(&id("nope")), [id("nope")].into_iter().collect());
        assert_eq!(g.tree_nodes(&id("lonely")), [id("lonely")].into_iter().collect());
    }

    #[test]
    fn parent_only_ids_become_nodes() {
        let g = PostGraph::build(&[Post::new("c", "x").with_parent("ghost")]);
        assert!(g.contains(&id("ghost")));
        assert_eq!(g.children(&id("ghost")), vec![&id("c")]);
    }

    #[test]
    fn duplicate_ids_take_the_last_parent() {
        let posts = vec![
            Post::new("a", "a"),
            Post::new("b", "b"),
            Post::new("c", "first").with_parent("a"),
            Post::new("c", "second").with_parent("b"),
        ];
        let g = PostGraph::build(&posts);
        assert_eq!(g.parent(&id("c")), Some(&id("b")));
        assert!(g.children(&id("a")).is_empty());
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn build_is_order_independent() {
        let mut posts = conversation();
        let a = PostGraph::build(&posts);
        posts.reverse();
        let b = PostGraph::build(&posts);
        for s in ["root1", "reply1", "reply2", "reply3", "lonely", "selfie"] {
            assert_eq!(a.tree_nodes(&id(s)), b.tree_nodes(&id(s)));
        }
    }

    #[test]
    fn posts_from_overlapping_trees_are_duplicated() {
        let posts = conversation();
        let g = PostGraph::build(&posts);
        let lookup = id_to_post_map(&posts);
        let out = posts_from_trees(&g, &[id("root1"), id("reply1"), id("missing")], &lookup);
        let ids: Vec<String> = out.iter().map(|p| p.id.to_string()).collect();
        assert_eq!(ids.len(), 4 + 2);
        assert_eq!(ids[0], "root1");
        assert_eq!(ids.iter().filter(|s| *s == "reply3").count(), 2);
    }
}
