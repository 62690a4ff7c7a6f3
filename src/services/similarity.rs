use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;

use crate::error::{AppError, AppResult};

/// Near-duplicate title threshold on the normalized similarity ratio.
pub const TITLE_SIMILARITY_THRESHOLD: f64 = 0.9;

/// Minimum normalized length before the containment fallback considers a
/// text substantial enough to compare.
const CONTAINMENT_MIN_CHARS: usize = 100;

static STOPWORDS: Lazy<HashSet<String>> = Lazy::new(|| {
    stop_words::get(stop_words::LANGUAGE::English)
        .into_iter()
        .collect()
});

/// Whether a (lowercase) token is an English stopword.
pub(crate) fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(token)
}

/// Lowercases and collapses whitespace for order-insensitive comparison.
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Similarity ratio between two titles in [0, 1], computed on normalized
/// text with Levenshtein distance.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_text(a);
    let b = normalize_text(b);
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(&a, &b)
}

/// The closest corpus document and its cosine similarity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityMatch {
    pub index: usize,
    pub score: f64,
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2 && !STOPWORDS.contains(*t))
        .map(|t| t.to_string())
        .collect()
}

fn term_frequencies(tokens: &[String]) -> HashMap<&str, f64> {
    let mut counts: HashMap<&str, f64> = HashMap::new();
    for token in tokens {
        *counts.entry(token.as_str()).or_insert(0.0) += 1.0;
    }
    let total = tokens.len() as f64;
    for value in counts.values_mut() {
        *value /= total;
    }
    counts
}

/// Finds the maximum TF-IDF cosine similarity between `candidate` and each
/// corpus document.
///
/// The vocabulary, document frequencies, and vectors are built over the
/// supplied corpus plus the candidate, so the result is relative to that
/// snapshot. Errors only when the candidate itself cannot be vectorized
/// (no usable tokens); callers fall back to the containment heuristic.
pub fn max_cosine_similarity<S: AsRef<str>>(
    candidate: &str,
    corpus: &[S],
) -> AppResult<Option<SimilarityMatch>> {
    let candidate_tokens = tokenize(candidate);
    if candidate_tokens.is_empty() {
        return Err(AppError::Similarity(
            "candidate text produced no tokens".to_string(),
        ));
    }
    if corpus.is_empty() {
        return Ok(None);
    }

    let corpus_tokens: Vec<Vec<String>> = corpus.iter().map(|doc| tokenize(doc.as_ref())).collect();

    // Document frequencies over the snapshot plus the candidate.
    let doc_count = corpus_tokens.len() + 1;
    let mut document_frequency: HashMap<&str, usize> = HashMap::new();
    for tokens in corpus_tokens.iter().chain(std::iter::once(&candidate_tokens)) {
        let unique: HashSet<&str> = tokens.iter().map(|t| t.as_str()).collect();
        for term in unique {
            *document_frequency.entry(term).or_insert(0) += 1;
        }
    }

    let idf = |term: &str| -> f64 {
        let df = document_frequency.get(term).copied().unwrap_or(0) as f64;
        ((doc_count as f64 + 1.0) / (df + 1.0)).ln() + 1.0
    };

    let weigh = |tokens: &[String]| -> HashMap<String, f64> {
        let mut vector: HashMap<String, f64> = term_frequencies(tokens)
            .into_iter()
            .map(|(term, tf)| (term.to_string(), tf * idf(term)))
            .collect();
        let norm: f64 = vector.values().map(|w| w * w).sum::<f64>().sqrt();
        if norm > 0.0 {
            for value in vector.values_mut() {
                *value /= norm;
            }
        }
        vector
    };

    let candidate_vector = weigh(&candidate_tokens);

    let mut best: Option<SimilarityMatch> = None;
    for (index, tokens) in corpus_tokens.iter().enumerate() {
        if tokens.is_empty() {
            continue;
        }
        let doc_vector = weigh(tokens);
        let score: f64 = candidate_vector
            .iter()
            .filter_map(|(term, weight)| doc_vector.get(term).map(|w| w * weight))
            .sum();
        if best.map_or(true, |b| score > b.score) {
            best = Some(SimilarityMatch { index, score });
        }
    }

    Ok(best)
}

/// Substring-containment duplicate heuristic, used when vectorization
/// fails on pathological text.
///
/// Two texts count as duplicates when at least half of the shorter one is a
/// literal substring of the longer one. Checked via the whole text and its
/// two halves, each of which covers ≥50% of the shorter text.
pub fn containment_duplicate(a: &str, b: &str) -> bool {
    let a = normalize_text(a);
    let b = normalize_text(b);
    let (shorter, longer) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };

    if shorter.len() < CONTAINMENT_MIN_CHARS {
        return false;
    }
    if longer.contains(shorter.as_str()) {
        return true;
    }
    let mid = shorter.len() / 2;
    // Split on a char boundary near the midpoint.
    let mid = (mid..shorter.len())
        .find(|i| shorter.is_char_boundary(*i))
        .unwrap_or(mid);
    longer.contains(&shorter[..mid]) || longer.contains(&shorter[mid..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_case_and_whitespace() {
        assert_eq!(normalize_text("  Hello\n  WORLD "), "hello world");
    }

    #[test]
    fn test_title_similarity_exact_and_near() {
        assert_eq!(title_similarity("Budget Vote", "budget  vote"), 1.0);
        let near = title_similarity(
            "City council votes on new budget",
            "City council votes on new budgets",
        );
        assert!(near > 0.9, "one-character edit should stay above 0.9, got {near}");
        let far = title_similarity("City council votes", "Championship finals recap");
        assert!(far < 0.5);
    }

    #[test]
    fn test_identical_documents_have_maximal_cosine() {
        let doc = "The council approved a revised municipal budget after months of \
                   negotiation, directing additional funds toward road maintenance";
        let result = max_cosine_similarity(doc, &[doc.to_string()]).unwrap().unwrap();
        assert_eq!(result.index, 0);
        assert!(result.score > 0.999);
    }

    #[test]
    fn test_unrelated_documents_have_low_cosine() {
        let result = max_cosine_similarity(
            "quarterly earnings beat analyst forecasts across banking stocks",
            &["the home team won the championship game in overtime".to_string()],
        )
        .unwrap()
        .unwrap();
        assert!(result.score < 0.3, "got {}", result.score);
    }

    #[test]
    fn test_best_match_index_points_at_closest_document() {
        let corpus = vec![
            "the home team won the championship game in overtime".to_string(),
            "council approves municipal budget for road maintenance projects".to_string(),
        ];
        let result = max_cosine_similarity(
            "municipal budget approved by council for road maintenance",
            &corpus,
        )
        .unwrap()
        .unwrap();
        assert_eq!(result.index, 1);
    }

    #[test]
    fn test_vectorization_fails_on_pathological_text() {
        let err = max_cosine_similarity("!!! ??? ... ---", &["some document".to_string()]);
        assert!(err.is_err());
    }

    #[test]
    fn test_empty_corpus_yields_no_match() {
        let corpus: Vec<String> = Vec::new();
        let result =
            max_cosine_similarity("a perfectly ordinary document text", &corpus).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_containment_detects_embedded_text() {
        let inner = "the committee published its quarterly findings on regional \
                     infrastructure spending and transit ridership this week";
        let outer = format!("BREAKING: {} — subscribe for more updates", inner);
        assert!(containment_duplicate(inner, &outer));
    }

    #[test]
    fn test_containment_ignores_short_texts() {
        assert!(!containment_duplicate("short text", "short text plus more"));
    }

    #[test]
    fn test_containment_rejects_unrelated_texts() {
        let a = "a long discussion of macroeconomic policy and its effect on \
                 regional employment figures over the past several decades";
        let b = "an unrelated match report describing the final minutes of a \
                 dramatic championship game decided by a last-second goal";
        assert!(!containment_duplicate(a, b));
    }
}
