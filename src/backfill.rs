use crate::database::Database;
use crate::record::TextRecord;
use crate::vector::check_embedding;
use crate::vectorizer::TextEmbedder;
use log::{debug, error, info};
use rayon::prelude::*;
use std::sync::{Arc, Mutex};

pub type ProgressCallback = Arc<Mutex<dyn FnMut(usize, usize) + Send>>;

const DEFAULT_CHUNK_SIZE: usize = 64;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackfillReport {
    /// Records that were missing an embedding when the run started.
    pub candidates: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// Logs progress in 5% steps.
pub fn make_logging_progress_callback(activity: &'static str) -> ProgressCallback {
    let mut last_percent: Option<usize> = None;
    Arc::new(Mutex::new(move |completed: usize, total: usize| {
        let percent = if total == 0 {
            100
        } else {
            ((completed.min(total) as f64 / total as f64) * 100.0).round() as usize
        };

        let should_log = match last_percent {
            Some(prev) => percent >= prev.saturating_add(5) || (percent == 100 && percent != prev),
            None => true,
        };

        if should_log {
            info!(
                "{} progress: {}% ({} / {} questions)",
                activity, percent, completed, total
            );
            last_percent = Some(percent);
        }
    }))
}

/// Computes embeddings for records that lack one.
///
/// Embeddings for a chunk are computed in parallel, then handed to the save
/// callback one by one. A failing record is counted and logged; the rest of
/// the batch carries on. Running it again only touches what is still missing.
pub struct Backfiller<'e> {
    embedder: &'e dyn TextEmbedder,
    chunk_size: usize,
    progress_callback: Option<ProgressCallback>,
}

impl<'e> Backfiller<'e> {
    pub fn new(embedder: &'e dyn TextEmbedder) -> Self {
        Backfiller {
            embedder,
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress_callback: None,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn set_progress_callback<F>(&mut self, callback: F)
    where
        F: FnMut(usize, usize) + Send + 'static,
    {
        self.progress_callback = Some(Arc::new(Mutex::new(callback)));
    }

    pub fn set_progress_handle(&mut self, handle: ProgressCallback) {
        self.progress_callback = Some(handle);
    }

    pub fn backfill_missing<S>(&self, records: &[TextRecord], mut save: S) -> BackfillReport
    where
        S: FnMut(&TextRecord, &[f64]) -> Result<(), String>,
    {
        let pending: Vec<&TextRecord> = records.iter().filter(|r| r.needs_embedding()).collect();
        let mut report = BackfillReport {
            candidates: pending.len(),
            ..BackfillReport::default()
        };

        if pending.is_empty() {
            info!("No questions missing embeddings - all embeddings are up to date");
            return report;
        }

        info!(
            "Backfilling embeddings for {} questions with the {} embedder...",
            pending.len(),
            self.embedder.name()
        );
        self.report_progress(0, pending.len());

        let dimension = self.embedder.dimension();
        let mut done = 0usize;
        for chunk in pending.chunks(self.chunk_size) {
            let vectors: Vec<Vec<f64>> = chunk
                .par_iter()
                .map(|record| self.embedder.embed(&record.combined_text()))
                .collect();

            for (record, vector) in chunk.iter().zip(vectors) {
                let outcome = match check_embedding(&vector, dimension) {
                    Ok(()) => save(record, &vector),
                    Err(e) => Err(format!(
                        "unusable embedding from {}: {}",
                        self.embedder.name(),
                        e
                    )),
                };

                match outcome {
                    Ok(()) => {
                        report.succeeded += 1;
                        debug!(
                            "Generated embedding for question ID {}: '{}'",
                            record.id, record.title
                        );
                    }
                    Err(e) => {
                        report.failed += 1;
                        error!(
                            "Failed to generate embedding for question ID {}: {}",
                            record.id, e
                        );
                        report.errors.push(format!("Question {}: {}", record.id, e));
                    }
                }
            }

            done += chunk.len();
            self.report_progress(done, pending.len());
        }

        info!(
            "Embedding backfill completed: {} successful, {} failed",
            report.succeeded, report.failed
        );

        report
    }

    /// Backfills every question in `db` that has no embedding yet.
    pub fn backfill_database(&self, db: &Database) -> Result<BackfillReport, String> {
        let records = db
            .questions_missing_embedding()
            .map_err(|e| format!("Failed to load questions: {}", e))?;

        Ok(self.backfill_missing(&records, |record, vector| {
            db.save_embedding(record.id, vector)
                .map_err(|e| format!("Failed to save embedding: {}", e))
        }))
    }

    fn report_progress(&self, completed: usize, total: usize) {
        if let Some(ref callback) = self.progress_callback {
            if let Ok(mut cb) = callback.lock() {
                cb(completed, total);
            }
        }
    }
}

/// One-shot backfill with the default chunk size and no progress reporting.
pub fn backfill_missing<S>(
    records: &[TextRecord],
    embedder: &dyn TextEmbedder,
    save: S,
) -> BackfillReport
where
    S: FnMut(&TextRecord, &[f64]) -> Result<(), String>,
{
    Backfiller::new(embedder).backfill_missing(records, save)
}
