use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::models::{ComponentPosts, Post, PostId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TreeStats {
    pub depth: usize,
    pub breadth: usize,
    pub num_nodes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RootTreeStats {
    pub root: PostId,
    #[serde(flatten)]
    pub stats: TreeStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct TreeNarratives {
    pub posts: Vec<Post>,
    pub tree_stats: Vec<RootTreeStats>,
    pub analysis_results: Vec<Value>,
}

/* Summary of discourse analysis results */
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldSummary {
    Numeric {
        mean: f64,
        min: f64,
        max: f64,
        count: usize,
    },
    Categorical(BTreeMap<String, usize>),
}

pub type NarrativeSummary = BTreeMap<String, FieldSummary>;

/* Similarity components */
#[derive(Debug, Clone, Serialize)]
pub struct SimilarityComponent {
    pub component_id: String,
    pub node_count: usize,
    pub posts: ComponentPosts,
}

/* LLM labelling */
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Classification {
    Structured(Value),
    Raw { raw_response: String },
}

impl Classification {
    /// Structured view for aggregation; raw fallbacks become `{"raw_response": ..}`.
    pub fn to_value(&self) -> Value {
        match self {
            Classification::Structured(v) => v.clone(),
            Classification::Raw { raw_response } => {
                serde_json::json!({ "raw_response": raw_response })
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlatformClassification {
    pub platform: String,
    pub classification: Classification,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentClassification {
    pub component_id: String,
    pub platforms: Vec<PlatformClassification>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyCategory {
    Reinforce,
    Challenge,
    Shift,
    Unknown,
}

impl ReplyCategory {
    pub const ALL: [ReplyCategory; 4] = [
        ReplyCategory::Reinforce,
        ReplyCategory::Challenge,
        ReplyCategory::Shift,
        ReplyCategory::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReplyCategory::Reinforce => "reinforce",
            ReplyCategory::Challenge => "challenge",
            ReplyCategory::Shift => "shift",
            ReplyCategory::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplyChain {
    pub root_id: PostId,
    pub root_post: String,
    pub replies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplyChainResult {
    pub category: ReplyCategory,
    pub raw_response: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RootReplyChainResult {
    pub root_id: PostId,
    pub replies: usize,
    #[serde(flatten)]
    pub result: ReplyChainResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DynamicsSummary {
    pub counts: BTreeMap<String, usize>,
    pub percentages: BTreeMap<String, f64>,
    pub total_analyzed: usize,
}

/* Whole-run summary */
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub generated_at: String,
    pub platforms: Vec<PlatformCount>,
    pub similarity_nodes: usize,
    pub similarity_edges: usize,
    pub components: usize,
    pub narrative: NarrativeSummary,
    pub dynamics: DynamicsSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlatformCount {
    pub platform: String,
    pub posts: usize,
}
