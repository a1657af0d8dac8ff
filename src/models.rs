use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Post identifier as it appears in the source data. Integers and strings are
/// kept apart so the record shape survives a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PostId {
    Int(i64),
    Text(String),
}

impl PostId {
    /// Empty string ids count as "no id".
    pub fn is_empty(&self) -> bool {
        matches!(self, PostId::Text(s) if s.trim().is_empty())
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostId::Int(n) => write!(f, "{}", n),
            PostId::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for PostId {
    fn from(s: &str) -> Self {
        PostId::Text(s.to_string())
    }
}

impl From<String> for PostId {
    fn from(s: String) -> Self {
        PostId::Text(s)
    }
}

impl From<i64> for PostId {
    fn from(n: i64) -> Self {
        PostId::Int(n)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<PostId>,
    pub post: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    /// Any other fields of the input record, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Post {
    pub fn new(id: impl Into<PostId>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            post: text.into(),
            platform: None,
            extra: Map::new(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<PostId>) -> Self {
        self.parent_id = Some(parent.into());
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    /// Parent that produces a graph edge: present and not the post itself.
    pub fn effective_parent(&self) -> Option<&PostId> {
        self.parent_id
            .as_ref()
            .filter(|p| !p.is_empty() && **p != self.id)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedPost {
    #[serde(flatten)]
    pub post: Post,
    /// Alignment score against the normalized corpus centroid.
    #[serde(rename = "ap")]
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct PlatformCorpus {
    pub name: String,
    pub posts: Vec<Post>,
}

impl PlatformCorpus {
    pub fn new(name: impl Into<String>, posts: Vec<Post>) -> Self {
        Self {
            name: name.into(),
            posts,
        }
    }
}

/// Posts of one similarity component bucketed per platform, in platform order.
/// Serializes as `{platformName: [post, ...], ...}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentPosts {
    buckets: Vec<(String, Vec<Post>)>,
}

impl ComponentPosts {
    pub fn with_platforms<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            buckets: names.into_iter().map(|n| (n.to_string(), Vec::new())).collect(),
        }
    }

    pub fn push(&mut self, platform: &str, post: Post) {
        match self.buckets.iter_mut().find(|(name, _)| name == platform) {
            Some((_, posts)) => posts.push(post),
            None => self.buckets.push((platform.to_string(), vec![post])),
        }
    }

    pub fn get(&self, platform: &str) -> Option<&[Post]> {
        self.buckets
            .iter()
            .find(|(name, _)| name == platform)
            .map(|(_, posts)| posts.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Post])> {
        self.buckets.iter().map(|(n, p)| (n.as_str(), p.as_slice()))
    }

    pub fn total_posts(&self) -> usize {
        self.buckets.iter().map(|(_, p)| p.len()).sum()
    }
}

impl Serialize for ComponentPosts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.buckets.len()))?;
        for (name, posts) in &self.buckets {
            map.serialize_entry(name, posts)?;
        }
        map.end()
    }
}
