use once_cell::sync::Lazy;
use regex::Regex;

use super::quality::{AD_PHRASES, FLUFF_PHRASES};

/// Boilerplate lines scrapers drag in around the actual text: cookie
/// banners, share prompts, paywall nags, continuation links.
const BOILERPLATE_PHRASES: &[&str] = &[
    "accept all cookies",
    "we use cookies",
    "cookie policy",
    "accept our use of cookies",
    "share this article",
    "share on facebook",
    "share on twitter",
    "follow us on",
    "sign up for our newsletter",
    "subscribe to our newsletter",
    "subscribe to continue reading",
    "to continue reading, subscribe",
    "this article is for subscribers only",
    "read more",
    "continue reading",
    "click to expand",
    "related articles",
];

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:https?://|www\.)\S+").unwrap());
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());
static BANG_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!{2,}").unwrap());
static QUESTION_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\?{2,}").unwrap());
static ELLIPSIS_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.{4,}").unwrap());
static CAPS_WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Z]{4,}\b").unwrap());
static LEADING_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,2}/\d{1,2}/\d{2,4}\s+").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

const HTML_ENTITIES: &[(&str, &str)] = &[
    ("&amp;", "&"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&apos;", "'"),
    ("&nbsp;", " "),
    ("&hellip;", "…"),
    ("&mdash;", "—"),
    ("&ndash;", "–"),
    ("&rsquo;", "'"),
    ("&lsquo;", "'"),
    ("&rdquo;", "\""),
    ("&ldquo;", "\""),
    ("&bull;", "•"),
    ("&middot;", "·"),
    ("&copy;", "©"),
    ("&reg;", "®"),
];

static BOILERPLATE_RES: Lazy<Vec<(Regex, &'static str)>> =
    Lazy::new(|| compile_phrase_patterns(BOILERPLATE_PHRASES));
static AD_RES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| compile_phrase_patterns(AD_PHRASES));
static FLUFF_RES: Lazy<Vec<(Regex, &'static str)>> =
    Lazy::new(|| compile_phrase_patterns(FLUFF_PHRASES));

fn compile_phrase_patterns(phrases: &[&'static str]) -> Vec<(Regex, &'static str)> {
    phrases
        .iter()
        .map(|p| {
            let pattern = format!("(?i){}", regex::escape(p));
            (Regex::new(&pattern).expect("static phrase pattern"), *p)
        })
        .collect()
}

fn remove_phrases(
    content: &mut String,
    patterns: &[(Regex, &'static str)],
    label: &str,
    modifications: &mut Vec<String>,
) {
    for (pattern, phrase) in patterns {
        if pattern.is_match(content) {
            *content = pattern.replace_all(content, "").into_owned();
            modifications.push(format!("Removed {} phrase: '{}'", label, phrase));
        }
    }
}

/// Cleans a stored summary: strips markup, decodes entities, removes
/// boilerplate and noise phrases, strips URLs and emails, and normalizes
/// punctuation, casing, and whitespace.
///
/// Returns the cleaned text and a list of the modifications applied.
/// Running it on already-clean text returns the input unchanged.
pub fn clean_summary(raw: &str) -> (String, Vec<String>) {
    let mut content = raw.to_string();
    let mut modifications = Vec::new();

    // Markup and entities
    if content.contains('<') && content.contains('>') {
        let stripped = TAG_RE.replace_all(&content, " ").into_owned();
        if stripped != content {
            content = stripped;
            modifications.push("Removed HTML formatting".to_string());
        }
    }
    for (entity, replacement) in HTML_ENTITIES {
        if content.contains(entity) {
            content = content.replace(entity, replacement);
        }
    }

    // Links and addresses carry no prose value in a summary
    if URL_RE.is_match(&content) {
        content = URL_RE.replace_all(&content, "").into_owned();
        modifications.push("Removed URLs".to_string());
    }
    if EMAIL_RE.is_match(&content) {
        content = EMAIL_RE.replace_all(&content, "").into_owned();
        modifications.push("Removed email addresses".to_string());
    }

    // Scraper boilerplate, then the ad/fluff lexicons
    remove_phrases(&mut content, &BOILERPLATE_RES, "boilerplate", &mut modifications);
    remove_phrases(&mut content, &AD_RES, "ad", &mut modifications);
    remove_phrases(&mut content, &FLUFF_RES, "fluff", &mut modifications);

    // Punctuation runs
    let before = content.clone();
    content = BANG_RUN_RE.replace_all(&content, "!").into_owned();
    content = QUESTION_RUN_RE.replace_all(&content, "?").into_owned();
    content = ELLIPSIS_RUN_RE.replace_all(&content, "...").into_owned();
    if content != before {
        modifications.push("Normalized excessive punctuation".to_string());
    }

    // Sentence-cased shouting, keeping short acronyms as-is
    let before = content.clone();
    content = CAPS_WORD_RE
        .replace_all(&content, |caps: &regex::Captures<'_>| {
            let word = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
            if word.len() <= 5 {
                word.to_string()
            } else {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => format!("{}{}", first, chars.as_str().to_lowercase()),
                    None => word.to_string(),
                }
            }
        })
        .into_owned();
    if content != before {
        modifications.push("Fixed excessive ALL CAPS text".to_string());
    }

    content = LEADING_DATE_RE.replace(&content, "").into_owned();

    // Whitespace last, after removals may have left gaps
    let collapsed = WHITESPACE_RE.replace_all(content.trim(), " ").into_owned();
    if collapsed.len() + 10 < raw.len() && !modifications.iter().any(|m| m.contains("whitespace")) {
        // only note it when the shrink is not already explained
        if raw.split_whitespace().eq(collapsed.split_whitespace()) {
            modifications.push("Removed excessive whitespace".to_string());
        }
    }

    (collapsed, modifications)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_passes_through() {
        let text = "A plain, already-clean summary about municipal budgets.";
        let (cleaned, modifications) = clean_summary(text);
        assert_eq!(cleaned, text);
        assert!(modifications.is_empty());
    }

    #[test]
    fn test_strips_markup_and_entities() {
        let (cleaned, modifications) =
            clean_summary("<p>Fish &amp; chips</p> <a href=\"x\">remained popular</a>");
        assert_eq!(cleaned, "Fish & chips remained popular");
        assert!(modifications.iter().any(|m| m.contains("HTML")));
    }

    #[test]
    fn test_strips_urls_and_emails() {
        let (cleaned, _) = clean_summary(
            "Contact press@example.com or visit https://example.com/story for details.",
        );
        assert!(!cleaned.contains('@'));
        assert!(!cleaned.contains("https://"));
        assert!(cleaned.contains("for details."));
    }

    #[test]
    fn test_removes_boilerplate_case_insensitively() {
        let (cleaned, modifications) =
            clean_summary("We Use Cookies to improve things. The story itself follows. Read More");
        assert!(!cleaned.to_lowercase().contains("we use cookies"));
        assert!(!cleaned.to_lowercase().contains("read more"));
        assert!(cleaned.contains("The story itself follows."));
        assert!(modifications.iter().any(|m| m.contains("boilerplate")));
    }

    #[test]
    fn test_normalizes_punctuation_runs() {
        let (cleaned, _) = clean_summary("Astonishing result!!! Really??? Wait for it......");
        assert!(cleaned.contains("result!"));
        assert!(cleaned.contains("Really?"));
        assert!(cleaned.contains("it..."));
        assert!(!cleaned.contains("!!"));
    }

    #[test]
    fn test_caps_normalized_but_acronyms_preserved() {
        let (cleaned, _) = clean_summary("NASA confirmed the INCREDIBLE results on Monday.");
        assert!(cleaned.contains("NASA"));
        assert!(cleaned.contains("Incredible"));
    }

    #[test]
    fn test_strips_leading_date_stamp() {
        let (cleaned, _) = clean_summary("12/03/2024 The council met again on Tuesday.");
        assert!(cleaned.starts_with("The council"));
    }
}
