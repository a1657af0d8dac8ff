use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::EmbedError;
use crate::oracle::CallPolicy;

/// Sentence-embedding capability. Implementations must return one vector per
/// input text, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(
        &self,
        texts: &[String],
        batch_size: usize,
        show_progress: bool,
    ) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// Embed and enforce the count/dimension contract on whatever the model returns.
pub async fn embed_checked(
    embedder: &dyn Embedder,
    texts: &[String],
    batch_size: usize,
    show_progress: bool,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    let vectors = embedder.embed(texts, batch_size.max(1), show_progress).await?;
    if vectors.len() != texts.len() {
        return Err(EmbedError::CountMismatch {
            expected: texts.len(),
            got: vectors.len(),
        });
    }
    let dim = vectors[0].len();
    if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
        return Err(EmbedError::DimensionMismatch {
            expected: dim,
            got: bad.len(),
        });
    }
    Ok(vectors)
}

/// Embedder speaking the OpenAI-compatible `/embeddings` protocol.
pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    policy: CallPolicy,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        policy: CallPolicy,
    ) -> Result<Self, EmbedError> {
        let client = reqwest::Client::builder().timeout(policy.timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            policy,
        })
    }

    async fn request_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let url = format!("{}/embeddings", self.base_url);
        let mut req = self.client.post(&url).json(&EmbeddingRequest {
            model: &self.model,
            input: batch,
        });
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(EmbedError::Request(format!("{} from {}: {}", status, url, body)));
        }

        let mut parsed: EmbeddingResponse = resp.json().await?;
        // Servers may return data out of order; `index` is authoritative when present.
        parsed.data.sort_by_key(|d| d.index.unwrap_or(usize::MAX));
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    async fn request_with_retry(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut attempt = 0u32;
        loop {
            match self.request_batch(batch).await {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.policy.max_retries => {
                    let delay = self.policy.backoff(attempt);
                    attempt += 1;
                    warn!(
                        "Embedding request failed - attempt={}/{}, retry_in={}ms, error={}",
                        attempt,
                        self.policy.max_retries.saturating_add(1),
                        delay.as_millis(),
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(
        &self,
        texts: &[String],
        batch_size: usize,
        show_progress: bool,
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        let start = std::time::Instant::now();
        let total = texts.len();
        let mut out = Vec::with_capacity(total);

        for (i, batch) in texts.chunks(batch_size.max(1)).enumerate() {
            let vectors = self.request_with_retry(batch).await?;
            if vectors.len() != batch.len() {
                return Err(EmbedError::CountMismatch {
                    expected: batch.len(),
                    got: vectors.len(),
                });
            }
            out.extend(vectors);
            if show_progress {
                info!(
                    "Embedding progress - batch={}, embedded={}/{}",
                    i + 1,
                    out.len(),
                    total
                );
            }
        }

        debug!(
            "Embedding completed - model={}, texts={}, duration={:.2}s",
            self.model,
            total,
            start.elapsed().as_secs_f32()
        );
        Ok(out)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FixedEmbedder;
    use super::*;
    use std::time::Duration;

    struct ShortEmbedder;

    #[async_trait]
    impl Embedder for ShortEmbedder {
        async fn embed(
            &self,
            _t: &[String],
            _b: usize,
            _p: bool,
        ) -> Result<Vec<Vec<f32>>, EmbedError> {
            Ok(vec![vec![1.0]])
        }
    }

    #[tokio::test]
    async fn checked_embedding_rejects_count_mismatch() {
        let texts = vec!["a".to_string(), "b".to_string()];
        let err = embed_checked(&ShortEmbedder, &texts, 8, false).await.unwrap_err();
        assert!(matches!(err, EmbedError::CountMismatch { expected: 2, got: 1 }));
    }

    #[tokio::test]
    async fn checked_embedding_rejects_ragged_dimensions() {
        let e = FixedEmbedder::new(&[("a", vec![1.0, 0.0])], vec![1.0]);
        let texts = vec!["a".to_string(), "b".to_string()];
        let err = embed_checked(&e, &texts, 8, false).await.unwrap_err();
        assert!(matches!(err, EmbedError::DimensionMismatch { expected: 2, got: 1 }));
    }

    #[tokio::test]
    async fn empty_input_skips_the_model() {
        let e = FixedEmbedder::new(&[], vec![1.0]);
        assert!(embed_checked(&e, &[], 8, false).await.unwrap().is_empty());
        assert_eq!(e.call_count(), 0);
    }

    #[tokio::test]
    async fn http_embedder_retries_per_policy_then_fails() {
        let policy = CallPolicy {
            timeout: Duration::from_secs(2),
            max_retries: 2,
            backoff_base: Duration::from_millis(1),
        };
        let e = HttpEmbedder::new("http://127.0.0.1:1/v1/", "", "m", policy).unwrap();
        assert_eq!(e.base_url, "http://127.0.0.1:1/v1");
        assert_eq!(e.policy.max_retries, 2);

        let start = std::time::Instant::now();
        let err = e.embed(&["x".to_string()], 8, false).await.unwrap_err();
        assert!(matches!(err, EmbedError::Request(_)));
        assert!(start.elapsed() < Duration::from_secs(10));
    }
}
