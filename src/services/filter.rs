use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::ContentItem,
    store::{ContentStore, SharedStore},
};

use super::{
    cleaning::clean_summary,
    quality::quality_score,
    similarity::{
        containment_duplicate, max_cosine_similarity, normalize_text, title_similarity,
        TITLE_SIMILARITY_THRESHOLD,
    },
};

pub const DEFAULT_QUALITY_THRESHOLD: f64 = 0.5;
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;
pub const DEFAULT_BATCH_LIMIT: i64 = 1000;

/// Size of the recent filtered window duplicates are compared against.
const COMPARISON_WINDOW: i64 = 1000;

/// Upper bound on concurrently processed items within a batch.
const MAX_WORKERS: usize = 8;

#[derive(Debug, Clone, Deserialize)]
pub struct FilterOptions {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f64,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default, alias = "dryrun")]
    pub dry_run: bool,
    #[serde(default)]
    pub verbose: bool,
}

fn default_limit() -> i64 {
    DEFAULT_BATCH_LIMIT
}

fn default_quality_threshold() -> f64 {
    DEFAULT_QUALITY_THRESHOLD
}

fn default_similarity_threshold() -> f64 {
    DEFAULT_SIMILARITY_THRESHOLD
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_BATCH_LIMIT,
            quality_threshold: DEFAULT_QUALITY_THRESHOLD,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            dry_run: false,
            verbose: false,
        }
    }
}

/// Per-item outcome, reported when `verbose` is set.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ItemOutcome {
    pub id: Uuid,
    pub url: String,
    pub title: String,
    pub action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Aggregate counters for one filter run.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct FilterReport {
    pub processed: usize,
    pub duplicates: usize,
    pub low_quality: usize,
    pub cleaned: usize,
    pub deleted: usize,
    pub errors: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub outcomes: Vec<ItemOutcome>,
}

/// Verdict for one item, computed entirely against the batch snapshot.
#[derive(Debug)]
enum Verdict {
    Duplicate {
        reason: String,
    },
    LowQuality {
        score: f64,
        reason: String,
    },
    Keep {
        cleaned_summary: String,
        score: f64,
        factors: Vec<String>,
        modified: bool,
        /// Stored items this candidate supersedes (similarity duplicates
        /// of strictly lower quality).
        supersedes: Vec<Uuid>,
    },
}

/// Corpus snapshot read once at batch start. Verdicts computed against it
/// never observe writes made for sibling items of the same batch.
struct FilterSnapshot {
    /// The unfiltered items being processed.
    batch: Vec<ContentItem>,
    /// Recent filter-approved items, the duplicate-comparison window.
    window: Vec<ContentItem>,
    /// Combined texts: window first, then batch, index-aligned with
    /// `window` ++ `batch`.
    texts: Vec<String>,
}

impl FilterSnapshot {
    fn new(batch: Vec<ContentItem>, window: Vec<ContentItem>) -> Self {
        let texts = window
            .iter()
            .chain(batch.iter())
            .map(|item| item.combined_text())
            .collect();
        Self {
            batch,
            window,
            texts,
        }
    }

    /// All items except the candidate, paired with whether each lives in
    /// the current batch.
    fn others<'a>(&'a self, candidate: &'a ContentItem) -> impl Iterator<Item = (&'a ContentItem, bool)> {
        self.window
            .iter()
            .map(|item| (item, false))
            .chain(self.batch.iter().map(|item| (item, true)))
            .filter(move |(item, _)| item.id != candidate.id)
    }
}

/// Whether `a` survives a symmetric within-batch duplicate pair.
///
/// Deterministic regardless of worker interleaving: the older item wins,
/// ties broken by id, so exactly one member of the pair is dropped.
fn wins_batch_tiebreak(a: &ContentItem, b: &ContentItem) -> bool {
    match a.timestamp.cmp(&b.timestamp) {
        std::cmp::Ordering::Less => true,
        std::cmp::Ordering::Greater => false,
        std::cmp::Ordering::Equal => a.id < b.id,
    }
}

fn stored_quality(item: &ContentItem) -> f64 {
    item.quality_score
        .unwrap_or_else(|| quality_score(item).0)
}

/// Deduplication, quality scoring, and cleaning over bounded batches.
///
/// Verdicts are corpus-relative: an item's fate can depend on which other
/// items sit in its comparison window. Re-running on an unchanged corpus
/// changes nothing, because approved items leave the unfiltered batch.
pub struct ContentFilter {
    store: SharedStore,
}

impl ContentFilter {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Runs one filter batch and returns the aggregate report.
    ///
    /// Per-item failures are counted and logged; they never abort
    /// processing of sibling items.
    pub async fn run(&self, options: FilterOptions) -> AppResult<FilterReport> {
        let batch = self.store.recent_unfiltered(options.limit).await?;
        if batch.is_empty() {
            tracing::info!("No unfiltered content to process");
            return Ok(FilterReport::default());
        }
        let window = self.store.recent_filtered(COMPARISON_WINDOW).await?;

        tracing::info!(
            batch = batch.len(),
            window = window.len(),
            quality_threshold = options.quality_threshold,
            similarity_threshold = options.similarity_threshold,
            dry_run = options.dry_run,
            "Starting filter run"
        );

        let snapshot = Arc::new(FilterSnapshot::new(batch, window));
        let report = Arc::new(Mutex::new(FilterReport::default()));
        let semaphore = Arc::new(Semaphore::new(MAX_WORKERS));

        let mut tasks = Vec::with_capacity(snapshot.batch.len());
        for index in 0..snapshot.batch.len() {
            let snapshot = Arc::clone(&snapshot);
            let report = Arc::clone(&report);
            let semaphore = Arc::clone(&semaphore);
            let store = Arc::clone(&self.store);
            let options = options.clone();

            tasks.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                let item = &snapshot.batch[index];
                let verdict = assess_item(item, index, &snapshot, &options);
                apply_verdict(&store, &report, item, verdict, &options).await;
            }));
        }

        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Filter worker panicked");
                report.lock().await.errors += 1;
            }
        }

        let mut report = Arc::try_unwrap(report)
            .map_err(|_| AppError::Internal("filter report still shared".to_string()))?
            .into_inner();
        report.processed = snapshot.batch.len();

        tracing::info!(
            processed = report.processed,
            duplicates = report.duplicates,
            low_quality = report.low_quality,
            cleaned = report.cleaned,
            deleted = report.deleted,
            errors = report.errors,
            dry_run = options.dry_run,
            "Filter run completed"
        );

        Ok(report)
    }
}

/// Computes the verdict for one item. Checks short-circuit in order:
/// exact URL, exact/near title, content similarity, quality threshold.
fn assess_item(
    item: &ContentItem,
    batch_index: usize,
    snapshot: &FilterSnapshot,
    options: &FilterOptions,
) -> Verdict {
    // 1. Exact URL match
    for (other, in_batch) in snapshot.others(item) {
        if other.url == item.url {
            if !in_batch || !wins_batch_tiebreak(item, other) {
                return Verdict::Duplicate {
                    reason: "Exact URL match".to_string(),
                };
            }
        }
    }

    // 2. Exact or near-exact title match
    let normalized_title = normalize_text(&item.title);
    for (other, in_batch) in snapshot.others(item) {
        let exact = normalize_text(&other.title) == normalized_title;
        let near = exact || title_similarity(&item.title, &other.title) > TITLE_SIMILARITY_THRESHOLD;
        if near && (!in_batch || !wins_batch_tiebreak(item, other)) {
            let reason = if exact {
                "Title match".to_string()
            } else {
                format!("Similar title (above {} threshold)", TITLE_SIMILARITY_THRESHOLD)
            };
            return Verdict::Duplicate { reason };
        }
    }

    // Quality is needed both for the similarity tie-break and the
    // threshold check below.
    let (score, factors) = quality_score(item);
    let mut supersedes = Vec::new();

    // 3. Content similarity over the snapshot, candidate excluded
    let text_index = snapshot.window.len() + batch_index;
    let corpus: Vec<&str> = snapshot
        .texts
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != text_index)
        .map(|(_, t)| t.as_str())
        .collect();
    // Index into `corpus` maps back onto window ++ batch with the
    // candidate's own slot removed.
    let resolve = |corpus_index: usize| -> (&ContentItem, bool) {
        let absolute = if corpus_index >= text_index {
            corpus_index + 1
        } else {
            corpus_index
        };
        if absolute < snapshot.window.len() {
            (&snapshot.window[absolute], false)
        } else {
            (&snapshot.batch[absolute - snapshot.window.len()], true)
        }
    };

    match max_cosine_similarity(&item.combined_text(), &corpus) {
        Ok(Some(best)) if best.score > options.similarity_threshold => {
            let (other, in_batch) = resolve(best.index);
            let other_quality = stored_quality(other);
            let candidate_survives = if in_batch {
                score > other_quality
                    || (score == other_quality && wins_batch_tiebreak(item, other))
            } else {
                score > other_quality
            };
            if candidate_survives {
                if !in_batch {
                    supersedes.push(other.id);
                }
            } else {
                return Verdict::Duplicate {
                    reason: format!("Similar content (score: {:.2})", best.score),
                };
            }
        }
        Ok(_) => {}
        Err(e) => {
            // Vectorizer failure falls back to substring containment
            // rather than failing the item.
            tracing::warn!(url = %item.url, error = %e, "Similarity fallback engaged");
            let candidate_text = item.combined_text();
            for (other, in_batch) in snapshot.others(item) {
                if containment_duplicate(&candidate_text, &other.combined_text())
                    && (!in_batch || !wins_batch_tiebreak(item, other))
                {
                    return Verdict::Duplicate {
                        reason: "Text largely contained in another item".to_string(),
                    };
                }
            }
        }
    }

    // 4. Quality threshold
    if score < options.quality_threshold {
        return Verdict::LowQuality {
            score,
            reason: format!(
                "Quality score {:.2} below threshold {:.2}",
                score, options.quality_threshold
            ),
        };
    }

    // 5. Clean the survivor
    let (cleaned_summary, modifications) = clean_summary(&item.content_summary);
    Verdict::Keep {
        modified: !modifications.is_empty(),
        cleaned_summary,
        score,
        factors,
        supersedes,
    }
}

async fn apply_verdict(
    store: &SharedStore,
    report: &Mutex<FilterReport>,
    item: &ContentItem,
    verdict: Verdict,
    options: &FilterOptions,
) {
    let outcome = match &verdict {
        Verdict::Duplicate { reason } => {
            tracing::info!(url = %item.url, title = %item.title, reason = %reason, "Duplicate detected");
            ItemOutcome {
                id: item.id,
                url: item.url.clone(),
                title: item.title.clone(),
                action: "duplicate",
                reason: Some(reason.clone()),
            }
        }
        Verdict::LowQuality { score, reason } => {
            tracing::info!(url = %item.url, score = %score, "Low quality content detected");
            ItemOutcome {
                id: item.id,
                url: item.url.clone(),
                title: item.title.clone(),
                action: "low_quality",
                reason: Some(reason.clone()),
            }
        }
        Verdict::Keep { .. } => ItemOutcome {
            id: item.id,
            url: item.url.clone(),
            title: item.title.clone(),
            action: "kept",
            reason: None,
        },
    };

    let mut deleted = 0usize;
    let mut failed = false;

    if !options.dry_run {
        match &verdict {
            Verdict::Duplicate { .. } | Verdict::LowQuality { .. } => {
                match store.delete_content(item.id).await {
                    Ok(true) => deleted += 1,
                    Ok(false) => {}
                    Err(e) => {
                        tracing::error!(url = %item.url, error = %e, "Failed to delete item");
                        failed = true;
                    }
                }
            }
            Verdict::Keep {
                cleaned_summary,
                score,
                factors,
                supersedes,
                ..
            } => {
                for superseded in supersedes {
                    match store.delete_content(*superseded).await {
                        Ok(true) => {
                            tracing::info!(
                                superseded = %superseded,
                                replacement = %item.id,
                                "Removed lower-quality similar item"
                            );
                            deleted += 1;
                        }
                        Ok(false) => {}
                        Err(e) => {
                            tracing::error!(id = %superseded, error = %e, "Failed to delete superseded item");
                            failed = true;
                        }
                    }
                }
                if let Err(e) = store
                    .apply_filter_verdict(item.id, cleaned_summary, *score, factors)
                    .await
                {
                    tracing::error!(url = %item.url, error = %e, "Failed to persist verdict");
                    failed = true;
                }
            }
        }
    }

    let mut report = report.lock().await;
    match &verdict {
        Verdict::Duplicate { .. } => report.duplicates += 1,
        Verdict::LowQuality { .. } => report.low_quality += 1,
        Verdict::Keep { modified, .. } => {
            if *modified {
                report.cleaned += 1;
            }
        }
    }
    report.deleted += deleted;
    if failed {
        report.errors += 1;
    }
    if options.verbose {
        report.outcomes.push(outcome);
    }
}
