use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::embed::{embed_checked, Embedder};
use crate::error::Result;
use crate::models::{Post, PostId, RankedPost};
use crate::similarity::{dot, normalized, vector_sum};
use crate::text::strip_social_markup;

/// Centroid-alignment ranking: every post is scored by the dot product of its
/// embedding with the normalized sum of all embeddings in the corpus. O(n·d),
/// no pairwise similarity matrix.
pub struct FastLexRank {
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    show_progress: bool,
}

impl FastLexRank {
    pub fn new(embedder: Arc<dyn Embedder>, batch_size: usize, show_progress: bool) -> Self {
        Self {
            embedder,
            batch_size,
            show_progress,
        }
    }

    pub async fn rank(&self, posts: &[Post]) -> Result<Vec<RankedPost>> {
        if posts.is_empty() {
            debug!("Ranking skipped - no posts");
            return Ok(Vec::new());
        }
        let start = std::time::Instant::now();

        let texts: Vec<String> = posts
            .iter()
            .map(|p| strip_social_markup(&p.post).trim().to_string())
            .collect();
        let embeddings =
            embed_checked(self.embedder.as_ref(), &texts, self.batch_size, self.show_progress)
                .await?;

        let centroid = normalized(&vector_sum(&embeddings));
        if centroid.is_none() {
            warn!("Ranking centroid has zero norm - posts={}, all scores set to 0", posts.len());
        }

        let mut ranked: Vec<RankedPost> = posts
            .iter()
            .zip(&embeddings)
            .map(|(post, e)| RankedPost {
                post: post.clone(),
                score: centroid.as_ref().map(|z| dot(e, z)).unwrap_or(0.0),
            })
            .collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

        info!(
            "Ranking completed - posts={}, top_score={:.4}, duration={:.2}s",
            ranked.len(),
            ranked[0].score,
            start.elapsed().as_secs_f32()
        );
        Ok(ranked)
    }
}

/// Ids of the first `n` ranked posts, used as tree anchors.
pub fn anchor_ids(ranked: &[RankedPost], n: usize) -> Vec<PostId> {
    ranked.iter().take(n).map(|r| r.post.id.clone()).collect()
}
