// src/viz_export.rs
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    fs,
    path::Path,
};

use crate::models::{PlatformCorpus, Post, PostId};
use crate::out_models::SimilarityComponent;
use crate::post_graph::PostGraph;
use crate::similarity_graph::SimilarityGraph;

/* -------------------------------------------------------------------------- */
/* Entry point                                                                */
/* -------------------------------------------------------------------------- */

/// Write the D3-ready similarity network and reply trees into `out/<date>/`.
pub fn write_all_viz(
    out_dir_for_date: &Path,
    date: &str,
    graph: &SimilarityGraph,
    corpora: &[PlatformCorpus],
    components: &[SimilarityComponent],
    post_graph: &PostGraph,
    roots: &[PostId],
    lookup: &HashMap<PostId, Post>,
) -> Result<()> {
    fs::create_dir_all(out_dir_for_date)
        .with_context(|| format!("create {:?}", out_dir_for_date))?;

    let network = build_network(graph, corpora, components);
    write_json(out_dir_for_date.join("viz.similarity.json"), &network)?;

    let trees: Vec<VTree> = roots.iter().map(|r| build_tree(post_graph, r, lookup)).collect();
    write_json(
        out_dir_for_date.join("viz.trees.json"),
        &json!({ "date": date, "trees": trees }),
    )?;

    Ok(())
}

fn write_json<P: AsRef<Path>, T: ?Sized + Serialize>(path: P, value: &T) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, serde_json::to_vec_pretty(value)?).with_context(|| format!("write {:?}", path))
}

/* -------------------------------------------------------------------------- */
/* 1) Similarity network                                                      */
/* -------------------------------------------------------------------------- */

#[derive(Serialize)]
struct VNode {
    id: usize,
    platform: String,
    post_id: Option<PostId>,
    component: Option<usize>, // index into components, None for isolated nodes
}

#[derive(Serialize)]
struct VLink {
    source: usize,
    target: usize,
    weight: f32,
}

#[derive(Serialize)]
struct VNetwork {
    nodes: Vec<VNode>,
    links: Vec<VLink>,
    components: Vec<String>,
    offsets: BTreeMap<String, usize>, // first node id of each platform
}

fn build_network(
    graph: &SimilarityGraph,
    corpora: &[PlatformCorpus],
    components: &[SimilarityComponent],
) -> VNetwork {
    // Components come out of the graph in the same order they were reported.
    let mut membership: HashMap<usize, usize> = HashMap::new();
    for (ci, members) in graph.components().into_iter().enumerate() {
        for n in members {
            membership.insert(n, ci);
        }
    }

    let nodes = (0..graph.node_count())
        .map(|id| {
            let range = graph.platform_of(id);
            let post_id = range.and_then(|r| {
                corpora
                    .iter()
                    .find(|c| c.name == r.name)
                    .and_then(|c| c.posts.get(id - r.offset))
                    .map(|p| p.id.clone())
            });
            VNode {
                id,
                platform: range.map(|r| r.name.clone()).unwrap_or_default(),
                post_id,
                component: membership.get(&id).copied(),
            }
        })
        .collect();

    let links = graph
        .edges()
        .into_iter()
        .map(|(source, target, weight)| VLink { source, target, weight })
        .collect();

    VNetwork {
        nodes,
        links,
        components: components.iter().map(|c| c.component_id.clone()).collect(),
        offsets: graph.offsets(),
    }
}

/* -------------------------------------------------------------------------- */
/* 2) Reply trees                                                             */
/* -------------------------------------------------------------------------- */

/// Flat node list in breadth-first order, one entry per post, ready for
/// `d3.stratify()` via `id` / `parent`.
#[derive(Serialize)]
struct VTree {
    root: PostId,
    nodes: Vec<VTreeNode>,
}

#[derive(Serialize)]
struct VTreeNode {
    id: PostId,
    parent: Option<PostId>, // None for the root
    depth: usize,
    text: Option<String>,
}

fn build_tree(graph: &PostGraph, root: &PostId, lookup: &HashMap<PostId, Post>) -> VTree {
    let mut nodes = Vec::new();
    let mut seen: HashSet<PostId> = HashSet::from([root.clone()]);
    let mut queue: VecDeque<(PostId, usize)> = VecDeque::from([(root.clone(), 0)]);

    while let Some((id, depth)) = queue.pop_front() {
        for child in graph.children(&id) {
            if seen.insert(child.clone()) {
                queue.push_back((child.clone(), depth + 1));
            }
        }
        let parent = if depth == 0 { None } else { graph.parent(&id).cloned() };
        nodes.push(VTreeNode {
            text: lookup.get(&id).map(|p| p.post.clone()),
            id,
            parent,
            depth,
        });
    }

    VTree {
        root: root.clone(),
        nodes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::id_to_post_map;
    use crate::similarity_graph::tripartite_from_embeddings;

    #[test]
    fn writes_network_and_trees() {
        let a = vec![vec![1.0, 0.0]];
        let b = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let c = vec![vec![0.0, 1.0]];
        let graph = tripartite_from_embeddings(
            &[("a", a.as_slice()), ("b", b.as_slice()), ("c", c.as_slice())],
            0.7,
        )
        .unwrap();
        let corpora = vec![
            PlatformCorpus::new("a", vec![Post::new("a0", "x")]),
            PlatformCorpus::new("b", vec![Post::new("b0", "x"), Post::new("b1", "y")]),
            PlatformCorpus::new("c", vec![Post::new("c0", "y")]),
        ];
        let comps =
            crate::similarity_graph::extract_connected_components(&graph, &corpora).unwrap();

        let posts = vec![
            Post::new("r", "root"),
            Post::new("k1", "reply").with_parent("r"),
            Post::new("k2", "deeper").with_parent("k1"),
        ];
        let pg = PostGraph::build(&posts);
        let lookup = id_to_post_map(&posts);

        let dir = tempfile::tempdir().unwrap();
        let roots = [PostId::from("r")];
        write_all_viz(dir.path(), "2026-01-01", &graph, &corpora, &comps, &pg, &roots, &lookup)
            .unwrap();

        let net = read_json(&dir.path().join("viz.similarity.json"));
        assert_eq!(net["nodes"].as_array().unwrap().len(), 4);
        assert_eq!(net["links"].as_array().unwrap().len(), 2);
        assert_eq!(net["nodes"][1]["post_id"], "b0");
        assert_eq!(net["nodes"][1]["platform"], "b");
        assert_eq!(net["offsets"]["c"], 3);

        let trees = read_json(&dir.path().join("viz.trees.json"));
        let tree = &trees["trees"][0];
        assert_eq!(tree["root"], "r");
        assert_eq!(tree["nodes"][0]["parent"], serde_json::Value::Null);
        assert_eq!(tree["nodes"][2]["id"], "k2");
        assert_eq!(tree["nodes"][2]["parent"], "k1");
        assert_eq!(tree["nodes"][2]["depth"], 2);
        assert_eq!(tree["nodes"][2]["text"], "deeper");
    }

    fn read_json(path: &Path) -> serde_json::Value {
        serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
    }

    #[test]
    fn long_linear_thread_builds_without_recursion() {
        let mut posts = vec![Post::new("p0", "start")];
        for i in 1..10_000 {
            posts.push(Post::new(format!("p{i}"), "more").with_parent(format!("p{}", i - 1)));
        }
        let pg = PostGraph::build(&posts);
        let lookup = id_to_post_map(&posts);

        let tree = build_tree(&pg, &PostId::from("p0"), &lookup);
        assert_eq!(tree.nodes.len(), 10_000);
        let last = &tree.nodes[9_999];
        assert_eq!(last.id, PostId::from("p9999"));
        assert_eq!(last.depth, 9_999);
        assert_eq!(last.parent, Some(PostId::from("p9998")));
    }

    #[test]
    fn subtree_root_has_no_parent_and_unknown_root_is_alone() {
        let posts = vec![
            Post::new("r", "root"),
            Post::new("a", "mid").with_parent("r"),
            Post::new("b", "leaf").with_parent("a"),
        ];
        let pg = PostGraph::build(&posts);
        let lookup = id_to_post_map(&posts);

        let sub = build_tree(&pg, &PostId::from("a"), &lookup);
        assert_eq!(sub.nodes.len(), 2);
        assert!(sub.nodes[0].parent.is_none());
        assert_eq!(sub.nodes[1].parent, Some(PostId::from("a")));

        let ghost = build_tree(&pg, &PostId::from("ghost"), &lookup);
        assert_eq!(ghost.nodes.len(), 1);
        assert!(ghost.nodes[0].text.is_none());
    }
}
