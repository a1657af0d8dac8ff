use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::api_types::{ApiPost, ApiPostFile};
use crate::error::{NarrativeError, Result};
use crate::models::{Post, PostId};
use crate::text::{clean_text, filter_posts_by_language, LanguageDetector};

/// Read a post file and validate every record. `platform` fills in records
/// that carry no platform label of their own.
pub fn load_posts(path: &Path, platform: Option<&str>) -> Result<Vec<Post>> {
    let start = std::time::Instant::now();
    debug!("Loading posts - path={}", path.display());

    let raw = std::fs::read_to_string(path)?;
    let file: ApiPostFile = serde_json::from_str(&raw)?;
    let posts = validate_posts(file.into_records(), platform)?;

    info!(
        "Post load completed - path={}, posts={}, duration={:.2}s",
        path.display(),
        posts.len(),
        start.elapsed().as_secs_f32()
    );
    Ok(posts)
}

pub fn validate_posts(records: Vec<ApiPost>, platform: Option<&str>) -> Result<Vec<Post>> {
    records
        .into_iter()
        .enumerate()
        .map(|(i, r)| validate_post(i, r, platform))
        .collect()
}

fn validate_post(index: usize, r: ApiPost, platform: Option<&str>) -> Result<Post> {
    let id = r
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| NarrativeError::Data(format!("record {} has no id", index)))?;
    let post = r.post.ok_or_else(|| {
        NarrativeError::Data(format!("record {} ({}) has no post text", index, id))
    })?;

    Ok(Post {
        id,
        parent_id: r.parent_id.filter(|p| !p.is_empty()),
        post,
        platform: r.platform.or_else(|| platform.map(str::to_string)),
        extra: r.extra,
    })
}

/// Clean post text in place and drop posts that end up empty.
pub fn normalize_posts(mut posts: Vec<Post>) -> Vec<Post> {
    for p in posts.iter_mut() {
        p.post = clean_text(&p.post);
    }
    let before = posts.len();
    posts.retain(|p| !p.post.is_empty());
    let removed = before - posts.len();
    if removed > 0 {
        debug!("Normalization - removed={} empty posts, retained={}", removed, posts.len());
    }
    posts
}

/// Load, clean and language-filter one platform's posts.
pub fn prepare_platform(
    path: &Path,
    platform: &str,
    detector: &dyn LanguageDetector,
    language: &str,
) -> Result<Vec<Post>> {
    let posts = normalize_posts(load_posts(path, Some(platform))?);
    let before = posts.len();
    let kept = filter_posts_by_language(detector, posts, language);
    if kept.len() < before {
        info!(
            "Language filter - platform={}, language={}, kept={}/{}",
            platform,
            language,
            kept.len(),
            before
        );
    }
    if kept.is_empty() {
        warn!("No posts left after filtering - platform={}", platform);
    }
    Ok(kept)
}

/// Id -> post lookup; a later record with the same id replaces an earlier one.
pub fn id_to_post_map(posts: &[Post]) -> HashMap<PostId, Post> {
    posts.iter().map(|p| (p.id.clone(), p.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_bare_array_and_keeps_int_ids() {
        let f = write_tmp(
            r#"[{"id": 1, "post": "root"},
                {"id": 2, "parent_id": 1, "post": "reply", "likes": 4}]"#,
        );
        let posts = load_posts(f.path(), Some("bluesky")).unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[1].parent_id, Some(PostId::Int(1)));
        assert_eq!(posts[1].platform.as_deref(), Some("bluesky"));
        assert_eq!(posts[1].extra["likes"], 4);
    }

    #[test]
    fn loads_wrapped_posts_and_blank_parent_is_none() {
        let f = write_tmp(
            r#"{"posts": [{"id": "a", "parent_id": "", "post": "x", "platform": "truth"}]}"#,
        );
        let posts = load_posts(f.path(), Some("other")).unwrap();
        assert!(posts[0].parent_id.is_none());
        assert_eq!(posts[0].platform.as_deref(), Some("truth"));
    }

    #[test]
    fn record_without_text_is_rejected() {
        let f = write_tmp(r#"[{"id": "a"}]"#);
        let err = load_posts(f.path(), None).unwrap_err();
        assert!(matches!(err, NarrativeError::Data(_)));
    }

    #[test]
    fn record_without_id_is_rejected() {
        let f = write_tmp(r#"[{"post": "hello"}]"#);
        assert!(matches!(load_posts(f.path(), None), Err(NarrativeError::Data(_))));
    }

    #[test]
    fn normalize_drops_posts_that_were_only_markup() {
        let posts = normalize_posts(vec![
            Post::new("a", "@bob #tag https://x.y"),
            Post::new("b", "<i>real</i> words"),
        ]);
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].post, "real words");
    }

    #[test]
    fn lookup_is_last_write_wins() {
        let posts = vec![
            Post::new("a", "old"),
            Post::new("b", "reply").with_parent("a"),
            Post::new("a", "new"),
        ];
        assert_eq!(id_to_post_map(&posts)[&PostId::from("a")].post, "new");
    }
}
