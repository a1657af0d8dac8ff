use serde::Deserialize;
use serde_json::{Map, Value};

use crate::models::PostId;

/// A post file is either a bare array of records or `{"posts": [...]}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ApiPostFile {
    List(Vec<ApiPost>),
    Wrapped { posts: Vec<ApiPost> },
}

impl ApiPostFile {
    pub fn into_records(self) -> Vec<ApiPost> {
        match self {
            ApiPostFile::List(v) => v,
            ApiPostFile::Wrapped { posts } => posts,
        }
    }
}

/// Raw record as found in the source JSON; nothing is trusted until validated.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiPost {
    #[serde(default)]
    pub id: Option<PostId>,
    #[serde(default)]
    pub parent_id: Option<PostId>,
    #[serde(default)]
    pub post: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
