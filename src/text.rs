use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

use crate::models::Post;

static MENTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@\w+").expect("valid mention regex"));
static HASHTAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#\w+").expect("valid hashtag regex"));
static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"http\S+").expect("valid url regex"));
static SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid space regex"));

pub const UNKNOWN_LANGUAGE: &str = "unknown";

/// Remove @mentions, #hashtags and URLs. Used by the ranker, which does not strip HTML.
pub fn strip_social_markup(text: &str) -> String {
    let s = MENTION_RE.replace_all(text, "");
    let s = HASHTAG_RE.replace_all(&s, "");
    URL_RE.replace_all(&s, "").into_owned()
}

/// Full cleaning for ingested posts: HTML text extraction, social markup removal,
/// NFC normalization and whitespace collapsing.
pub fn clean_text(text: &str) -> String {
    let plain = strip_html(text);
    let stripped = strip_social_markup(&plain);
    let nfc: String = stripped.nfc().collect();
    SPACE_RE.replace_all(&nfc, " ").trim().to_string()
}

fn strip_html(text: &str) -> String {
    if !text.contains('<') {
        return text.to_string();
    }
    let fragment = Html::parse_fragment(text);
    fragment.root_element().text().collect::<Vec<_>>().join("")
}

/// External language-id capability.
pub trait LanguageDetector: Send + Sync {
    fn detect(&self, text: &str) -> Result<String, String>;
}

/// Trigram detector backed by `whatlang`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhatlangDetector;

impl LanguageDetector for WhatlangDetector {
    fn detect(&self, text: &str) -> Result<String, String> {
        let info = whatlang::detect(text).ok_or_else(|| "no language detected".to_string())?;
        Ok(iso_639_1(info.lang()).to_string())
    }
}

// whatlang reports ISO 639-3; the filter speaks 639-1 for the common cases.
fn iso_639_1(lang: whatlang::Lang) -> &'static str {
    use whatlang::Lang;
    match lang {
        Lang::Eng => "en",
        Lang::Spa => "es",
        Lang::Fra => "fr",
        Lang::Deu => "de",
        Lang::Ita => "it",
        Lang::Por => "pt",
        Lang::Nld => "nl",
        Lang::Rus => "ru",
        Lang::Ukr => "uk",
        Lang::Pol => "pl",
        Lang::Tur => "tr",
        Lang::Ara => "ar",
        Lang::Jpn => "ja",
        Lang::Kor => "ko",
        Lang::Cmn => "zh",
        Lang::Hin => "hi",
        other => other.code(),
    }
}

/// Never fails: detector errors map to `"unknown"`.
pub fn detect_post_language(detector: &dyn LanguageDetector, text: &str) -> String {
    match detector.detect(text) {
        Ok(code) => code,
        Err(e) => {
            debug!("Language detection failed - error={}", e);
            UNKNOWN_LANGUAGE.to_string()
        }
    }
}

pub fn filter_posts_by_language(
    detector: &dyn LanguageDetector,
    posts: Vec<Post>,
    language: &str,
) -> Vec<Post> {
    posts
        .into_iter()
        .filter(|p| detect_post_language(detector, &p.post) == language)
        .collect()
}
