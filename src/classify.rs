use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{OracleError, Result};
use crate::models::{ComponentPosts, Post};
use crate::narrative_tree::PostAnalyzer;
use crate::oracle::{llm_call, Oracle};
use crate::out_models::{
    Classification, ComponentClassification, DynamicsSummary, PlatformClassification, ReplyCategory,
    ReplyChain, ReplyChainResult, SimilarityComponent,
};
use crate::prompts::{messages_for, user_classify_post, user_reply_chain};

pub const DEFAULT_MAX_POSTS_PER_PLATFORM: usize = 10;

/// Strict JSON parse of an oracle answer; anything else is kept verbatim.
pub fn parse_classification(raw: &str) -> Classification {
    match serde_json::from_str::<Value>(raw.trim()) {
        Ok(v) => Classification::Structured(v),
        Err(e) => {
            debug!("Classification is not JSON, keeping raw text - error={}", e);
            Classification::Raw {
                raw_response: raw.to_string(),
            }
        }
    }
}

/// First label of the closed set found in the normalized answer, else `Unknown`.
pub fn parse_reply_category(normalized: &str) -> ReplyCategory {
    [ReplyCategory::Reinforce, ReplyCategory::Challenge, ReplyCategory::Shift]
        .into_iter()
        .find(|c| normalized.contains(c.as_str()))
        .unwrap_or(ReplyCategory::Unknown)
}

pub struct NarrativeClassifier {
    oracle: Arc<dyn Oracle>,
    max_tokens: u32,
    timeout: Duration,
}

impl NarrativeClassifier {
    pub fn new(oracle: Arc<dyn Oracle>, max_tokens: u32, timeout: Duration) -> Self {
        Self {
            oracle,
            max_tokens,
            timeout,
        }
    }

    pub async fn classify_post(
        &self,
        text: &str,
    ) -> std::result::Result<Classification, OracleError> {
        let messages = messages_for(user_classify_post(text));
        let answer =
            llm_call(self.oracle.as_ref(), &messages, self.max_tokens, self.timeout).await?;
        Ok(parse_classification(&answer))
    }

    /// Classifies each platform bucket of one component as a single joined text.
    /// Buckets that are empty or larger than `max_posts_per_platform` are skipped.
    pub async fn classify_component_posts(
        &self,
        posts: &ComponentPosts,
        max_posts_per_platform: usize,
    ) -> Result<Vec<PlatformClassification>> {
        let mut out = Vec::new();
        for (platform, bucket) in posts.iter() {
            if bucket.is_empty() {
                continue;
            }
            if bucket.len() > max_posts_per_platform {
                debug!(
                    "Skipping oversized bucket - platform={}, posts={}, cap={}",
                    platform,
                    bucket.len(),
                    max_posts_per_platform
                );
                continue;
            }
            let joined = bucket.iter().map(|p| p.post.as_str()).collect::<Vec<_>>().join(".");
            let classification = self.classify_post(&joined).await?;
            out.push(PlatformClassification {
                platform: platform.to_string(),
                classification,
            });
        }
        Ok(out)
    }

    pub async fn batch_classify_components(
        &self,
        components: &[SimilarityComponent],
        max_posts_per_platform: usize,
    ) -> Result<Vec<ComponentClassification>> {
        let start = std::time::Instant::now();
        let mut out = Vec::with_capacity(components.len());
        for (i, c) in components.iter().enumerate() {
            let platforms = self.classify_component_posts(&c.posts, max_posts_per_platform).await?;
            debug!(
                "Component classified - {}/{}, id={}, platforms={}",
                i + 1,
                components.len(),
                c.component_id,
                platforms.len()
            );
            out.push(ComponentClassification {
                component_id: c.component_id.clone(),
                platforms,
            });
        }
        info!(
            "Component classification completed - components={}, duration={:.2}s",
            components.len(),
            start.elapsed().as_secs_f32()
        );
        Ok(out)
    }
}

#[async_trait]
impl PostAnalyzer for NarrativeClassifier {
    async fn analyze(&self, post: &Post) -> Result<Value> {
        Ok(self.classify_post(&post.post).await?.to_value())
    }
}

pub struct ReplyChainAnalyzer {
    oracle: Arc<dyn Oracle>,
    max_tokens: u32,
    timeout: Duration,
}

impl ReplyChainAnalyzer {
    pub fn new(oracle: Arc<dyn Oracle>, max_tokens: u32, timeout: Duration) -> Self {
        Self {
            oracle,
            max_tokens,
            timeout,
        }
    }

    pub async fn analyze_reply_chain(
        &self,
        root_post: &str,
        replies: &[String],
    ) -> Result<ReplyChainResult> {
        let replies_json = serde_json::to_string_pretty(replies)?;
        let messages = messages_for(user_reply_chain(root_post, &replies_json));
        let answer =
            llm_call(self.oracle.as_ref(), &messages, self.max_tokens, self.timeout).await?;
        let normalized = answer.trim().to_lowercase();
        let category = parse_reply_category(&normalized);
        if category == ReplyCategory::Unknown {
            warn!("Reply chain label not recognised - response={:?}", normalized);
        }
        Ok(ReplyChainResult {
            category,
            raw_response: normalized,
        })
    }

    /// Analyzes chains batch by batch; calls inside a batch run concurrently and
    /// results keep input order.
    ///
    /// Batches themselves stay sequential, so at most `batch_size` oracle
    /// requests are in flight at once. Callers needing strictly one call at a
    /// time pass `batch_size = 1`.
    pub async fn batch_analyze_reply_chains(
        &self,
        chains: &[ReplyChain],
        batch_size: usize,
    ) -> Result<Vec<ReplyChainResult>> {
        if batch_size == 0 {
            return Err(crate::error::NarrativeError::Config(
                "batch_size must be positive".into(),
            ));
        }
        let start = std::time::Instant::now();
        let mut out = Vec::with_capacity(chains.len());
        for chunk in chains.chunks(batch_size) {
            let tasks = chunk
                .iter()
                .map(|c| self.analyze_reply_chain(&c.root_post, &c.replies));
            for result in join_all(tasks).await {
                out.push(result?);
            }
            debug!("Reply chain progress - analyzed={}/{}", out.len(), chains.len());
        }
        info!(
            "Reply chain analysis completed - chains={}, duration={:.2}s",
            chains.len(),
            start.elapsed().as_secs_f32()
        );
        Ok(out)
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Category counts and shares over a set of reply-chain results.
pub fn narrative_dynamics_summary(results: &[ReplyChainResult]) -> DynamicsSummary {
    let mut counts: BTreeMap<String, usize> = ReplyCategory::ALL
        .iter()
        .map(|c| (c.as_str().to_string(), 0))
        .collect();
    for r in results {
        *counts.entry(r.category.as_str().to_string()).or_insert(0) += 1;
    }

    let total = results.len();
    let percentages = if total == 0 {
        BTreeMap::new()
    } else {
        counts
            .iter()
            .map(|(k, &n)| (k.clone(), round2(n as f64 / total as f64 * 100.0)))
            .collect()
    };

    DynamicsSummary {
        counts,
        percentages,
        total_analyzed: total,
    }
}
