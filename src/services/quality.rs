use crate::models::ContentItem;

/// Sponsored/advertising phrases.
pub const AD_PHRASES: &[&str] = &[
    "sponsored content",
    "advertisement",
    "advertisement feature",
    "promoted content",
    "paid content",
    "sponsored by",
    "promoted by",
    "click here",
    "buy now",
    "limited time offer",
    "exclusive offer",
    "discount code",
    "promo code",
    "subscribe now",
    "sign up now",
];

/// Clickbait and low-quality hooks.
pub const CLICKBAIT_PHRASES: &[&str] = &[
    "you won't believe",
    "mind blowing",
    "will blow your mind",
    "jaw-dropping",
    "shocking",
    "you'll never guess",
    "this will change everything",
    "unbelievable",
    "game-changing",
    "this one weird trick",
    "secrets revealed",
    "what happens next",
    "doctors hate",
    "one weird trick",
    "crazy trick",
    "simple trick",
    "find out why",
    "don't miss",
];

/// Low-information filler.
pub const FLUFF_PHRASES: &[&str] = &[
    "in today's fast-paced world",
    "in this day and age",
    "needless to say",
    "it goes without saying",
    "as we all know",
    "when all is said and done",
    "at the end of the day",
    "the fact of the matter is",
    "experts say",
    "studies show",
    "according to experts",
    "according to research",
    "sources say",
    "many people are saying",
];

/// Source substrings that earn a reputation bonus.
pub const REPUTABLE_SOURCES: &[&str] = &[
    "bbc",
    "guardian",
    "nytimes",
    "washingtonpost",
    "reuters",
    "economist",
    "nature",
    "science",
    "nationalgeographic",
    "npr",
    "aljazeera",
    "theverge",
];

/// Top-level domains disproportionately used by spam mills.
const SUSPICIOUS_TLDS: &[&str] = &[".xyz", ".click", ".top", ".buzz", ".work", ".loan"];

const SHORT_CONTENT_CHARS: usize = 100;
const LONG_CONTENT_CHARS: usize = 1000;

fn count_phrase_matches(haystack: &str, phrases: &[&str]) -> usize {
    phrases.iter().filter(|p| haystack.contains(*p)).count()
}

fn host_of(url: &str) -> Option<&str> {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let host = rest.split(['/', '?', '#']).next()?;
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

fn domain_looks_suspicious(url: &str) -> bool {
    let Some(host) = host_of(url) else {
        return false;
    };
    let host = host.to_lowercase();
    if SUSPICIOUS_TLDS.iter().any(|tld| host.ends_with(tld)) {
        return true;
    }
    // A one- or two-character registrable label reads like a throwaway
    // redirector domain.
    let mut labels = host.rsplit('.');
    let _tld = labels.next();
    matches!(labels.next(), Some(label) if label.len() <= 2)
}

/// Scores an item's quality in [0, 1] from a neutral 0.5 baseline,
/// returning the score and the factors that moved it.
pub fn quality_score(item: &ContentItem) -> (f64, Vec<String>) {
    let mut score: f64 = 0.5;
    let mut factors = Vec::new();

    let content = item.content_summary.as_str();
    if content.is_empty() || item.title.is_empty() {
        factors.push("Missing content or title".to_string());
        return ((score - 0.4).clamp(0.0, 1.0), factors);
    }

    // Length
    let content_length = content.chars().count();
    if content_length < SHORT_CONTENT_CHARS {
        score -= 0.3;
        factors.push("Content too short".to_string());
    } else if content_length > LONG_CONTENT_CHARS {
        score += 0.15;
        factors.push("Substantial content length".to_string());
    }

    // Noise lexicons, each with a capped penalty scaled by match count
    let lower = content.to_lowercase();
    let ad_count = count_phrase_matches(&lower, AD_PHRASES);
    let clickbait_count = count_phrase_matches(&lower, CLICKBAIT_PHRASES);
    let fluff_count = count_phrase_matches(&lower, FLUFF_PHRASES);

    if ad_count > 0 {
        score -= 0.2 * (ad_count as f64 / 2.0).min(1.0);
        factors.push(format!("Contains {} ad phrases", ad_count));
    }
    if clickbait_count > 0 {
        score -= 0.15 * (clickbait_count as f64 / 2.0).min(1.0);
        factors.push(format!("Contains {} clickbait phrases", clickbait_count));
    }
    if fluff_count > 0 {
        score -= 0.1 * (fluff_count as f64 / 3.0).min(1.0);
        factors.push(format!("Contains {} fluff phrases", fluff_count));
    }

    // Excessive punctuation
    if has_punctuation_runs(content) {
        score -= 0.1;
        factors.push("Contains excessive punctuation".to_string());
    }

    // Shouting
    if count_caps_words(content) > 3 {
        score -= 0.1;
        factors.push("Contains excessive ALL CAPS text".to_string());
    }

    // Sentence structure
    if let Some(avg_words) = average_sentence_words(content) {
        if avg_words < 5.0 {
            score -= 0.1;
            factors.push("Very short sentences".to_string());
        } else if avg_words > 20.0 {
            score += 0.05;
            factors.push("Complex sentence structure".to_string());
        }
    }

    // Source reputation
    let source = item.source.to_lowercase();
    if REPUTABLE_SOURCES.iter().any(|rs| source.contains(rs)) {
        score += 0.15;
        factors.push("Reputable source".to_string());
    }

    if domain_looks_suspicious(&item.url) {
        score -= 0.15;
        factors.push("Suspicious domain".to_string());
    }

    // Reader feedback once enough votes exist to mean something
    let total_votes = item.total_votes();
    if total_votes > 10 {
        let feedback = (item.upvotes - item.downvotes) as f64 / (total_votes + 1) as f64;
        score += feedback * 0.1;
        factors.push(format!("User feedback adjusted score: {:.2}", feedback));
    }

    (score.clamp(0.0, 1.0), factors)
}

fn has_punctuation_runs(content: &str) -> bool {
    let mut bang_run = 0usize;
    let mut dot_run = 0usize;
    for c in content.chars() {
        match c {
            '!' | '?' => {
                bang_run += 1;
                dot_run = 0;
                if bang_run >= 2 {
                    return true;
                }
            }
            '.' => {
                dot_run += 1;
                bang_run = 0;
                if dot_run >= 4 {
                    return true;
                }
            }
            _ => {
                bang_run = 0;
                dot_run = 0;
            }
        }
    }
    false
}

fn count_caps_words(content: &str) -> usize {
    content
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 4 && w.chars().all(|c| c.is_ascii_uppercase()))
        .count()
}

fn average_sentence_words(content: &str) -> Option<f64> {
    let sentences: Vec<&str> = content
        .split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if sentences.is_empty() {
        return None;
    }
    let total_words: usize = sentences
        .iter()
        .map(|s| s.split_whitespace().count())
        .sum();
    Some(total_words as f64 / sentences.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::item;

    #[test]
    fn test_neutral_prose_scores_midrange() {
        let item = item("http://example.com/a", "Budget report", "Business", 1);
        let (score, _) = quality_score(&item);
        assert!((0.4..=0.8).contains(&score), "got {score}");
    }

    #[test]
    fn test_clickbait_strictly_decreases_score_below_cap() {
        let mut zero = item("http://example.com/a", "Report", "Tech", 1);
        zero.content_summary = "The committee published its quarterly findings on regional \
            infrastructure spending this week after reviewing the audit."
            .to_string();

        let mut one = zero.clone();
        one.content_summary = format!("{} You won't believe the schedule.", zero.content_summary);

        let mut two = one.clone();
        two.content_summary = format!("{} This one weird trick saved them.", one.content_summary);

        let (s0, _) = quality_score(&zero);
        let (s1, _) = quality_score(&one);
        let (s2, _) = quality_score(&two);
        assert!(s0 > s1, "{s0} !> {s1}");
        assert!(s1 > s2, "{s1} !> {s2}");
    }

    #[test]
    fn test_noise_penalties_are_capped() {
        let mut spammy = item("http://example.com/a", "Report", "Tech", 1);
        spammy.content_summary = format!(
            "{} shocking unbelievable jaw-dropping mind blowing doctors hate \
             you won't believe what happens next",
            spammy.content_summary
        );
        let (score, factors) = quality_score(&spammy);
        assert!(score >= 0.0);
        assert!(factors.iter().any(|f| f.contains("clickbait")));
    }

    #[test]
    fn test_reputable_source_bonus() {
        let plain = item("http://example.com/a", "Report", "Tech", 1);
        let mut reputable = plain.clone();
        reputable.source = "Reuters".to_string();

        let (plain_score, _) = quality_score(&plain);
        let (reputable_score, _) = quality_score(&reputable);
        assert!(reputable_score > plain_score);
    }

    #[test]
    fn test_suspicious_domain_penalty() {
        let plain = item("http://example.com/a", "Report", "Tech", 1);
        let mut shady = plain.clone();
        shady.url = "http://prizes.xyz/win".to_string();

        let (plain_score, _) = quality_score(&plain);
        let (shady_score, factors) = quality_score(&shady);
        assert!(shady_score < plain_score);
        assert!(factors.iter().any(|f| f.contains("Suspicious domain")));
    }

    #[test]
    fn test_vote_feedback_requires_volume() {
        let mut few = item("http://example.com/a", "Report", "Tech", 1);
        few.upvotes = 3;
        few.downvotes = 0;
        let (few_score, few_factors) = quality_score(&few);
        assert!(!few_factors.iter().any(|f| f.contains("feedback")));

        let mut many = few.clone();
        many.upvotes = 40;
        many.downvotes = 2;
        let (many_score, many_factors) = quality_score(&many);
        assert!(many_factors.iter().any(|f| f.contains("feedback")));
        assert!(many_score > few_score);
    }

    #[test]
    fn test_score_stays_in_bounds_for_pathological_input() {
        let mut awful = item("http://x.io/a", "SPAM", "Tech", 1);
        awful.content_summary = "BUY NOW!!! CLICK HERE!!! SHOCKING DEALS!!! WOW!!!".to_string();
        awful.downvotes = 500;
        awful.upvotes = 1;
        let (score, _) = quality_score(&awful);
        assert!((0.0..=1.0).contains(&score));

        let mut great = item("http://reuters.com/a", "Analysis", "Business", 1);
        great.content_summary = "A thorough sentence about fiscal policy and its effect on \
            employment across several regions, with detailed reporting from many sources. "
            .repeat(20);
        great.upvotes = 900;
        great.downvotes = 1;
        let (score, _) = quality_score(&great);
        assert!((0.0..=1.0).contains(&score));
    }
}
