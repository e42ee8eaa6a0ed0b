//! Concurrent ingestion
//!
//! A bounded pool of worker threads pulls paths from one channel and sends
//! results back over another. Each file is parsed independently, so a worker
//! never shares entities with another; the coordinator only appends.

use crate::adapter::{Dispatcher, ParseResult};
use crate::cancel::CancellationToken;
use crate::config::IngestConfig;
use crate::walk::collect_files;
use crossbeam::channel;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

/// Message sent from pipeline workers to the coordinator
#[derive(Debug)]
pub enum IngestMessage {
    Started { path: String },
    Parsed { path: String, result: ParseResult },
}

/// Outcome for one file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReport {
    pub path: String,
    #[serde(flatten)]
    pub result: ParseResult,
}

/// Everything one ingestion run produced, sorted by path
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub files: Vec<FileReport>,
    /// Files the walker found that no strategy handles
    pub skipped: usize,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl IngestReport {
    pub fn entity_count(&self) -> usize {
        self.files.iter().map(|f| f.result.entities.len()).sum()
    }

    pub fn relationship_count(&self) -> usize {
        self.files.iter().map(|f| f.result.relationships.len()).sum()
    }

    /// Files that produced at least one diagnostic
    pub fn files_with_errors(&self) -> impl Iterator<Item = &FileReport> {
        self.files.iter().filter(|f| !f.result.succeeded())
    }

    /// Files that produced entities despite diagnostics
    pub fn partial_count(&self) -> usize {
        self.files.iter().filter(|f| f.result.is_partial()).count()
    }

    /// All results merged into one, in path order
    pub fn merged(&self) -> ParseResult {
        let mut merged = ParseResult::new();
        for file in &self.files {
            merged.merge(file.result.clone());
        }
        merged
    }
}

/// Parses many files on a bounded worker pool
pub struct IngestPipeline {
    dispatcher: Dispatcher,
    workers: usize,
    cancel: CancellationToken,
}

impl IngestPipeline {
    pub fn new(config: &IngestConfig) -> Self {
        Self::with_dispatcher(Dispatcher::new(config, config.exclusion_list()), config.worker_count())
    }

    pub fn with_dispatcher(dispatcher: Dispatcher, workers: usize) -> Self {
        Self {
            dispatcher,
            workers: workers.max(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops the run; files not yet read come back cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Walk `root` and ingest every file a strategy handles
    pub fn ingest_dir(&self, root: &Path, extra_ignores: &[String]) -> IngestReport {
        self.ingest_dir_with_progress(root, extra_ignores, |_| {})
    }

    pub fn ingest_dir_with_progress(
        &self,
        root: &Path,
        extra_ignores: &[String],
        on_message: impl FnMut(&IngestMessage),
    ) -> IngestReport {
        let (files, skipped) = self.collect(root, extra_ignores);
        let mut report = self.run_with_progress(&files, on_message);
        report.skipped = skipped;
        report
    }

    /// Files under `root` that reach the dispatcher, and how many were skipped.
    ///
    /// Excluded files are kept: they come back with the "excluded" diagnostic.
    pub fn collect(&self, root: &Path, extra_ignores: &[String]) -> (Vec<PathBuf>, usize) {
        let (files, skipped): (Vec<PathBuf>, Vec<PathBuf>) = collect_files(root, extra_ignores)
            .into_iter()
            .partition(|path| self.dispatcher.is_excluded(path) || self.dispatcher.find_adapter(path).is_some());
        if !skipped.is_empty() {
            tracing::debug!("{} file(s) under {} have no strategy", skipped.len(), root.display());
        }
        (files, skipped.len())
    }

    /// Parse the given files concurrently
    pub fn run(&self, files: &[PathBuf]) -> IngestReport {
        self.run_with_progress(files, |_| {})
    }

    /// Parse the given files, reporting each worker message as it arrives
    pub fn run_with_progress(&self, files: &[PathBuf], mut on_message: impl FnMut(&IngestMessage)) -> IngestReport {
        let started = Instant::now();
        let workers = self.workers.min(files.len()).max(1);
        let (job_tx, job_rx) = channel::bounded::<&Path>(workers * 2);
        let (msg_tx, msg_rx) = channel::bounded::<IngestMessage>(workers * 2);
        let mut reports = Vec::with_capacity(files.len());

        thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let msg_tx = msg_tx.clone();
                scope.spawn(move || {
                    for path in job_rx {
                        let shown = path.to_string_lossy().to_string();
                        if msg_tx.send(IngestMessage::Started { path: shown.clone() }).is_err() {
                            break;
                        }
                        let result = self.dispatcher.parse_file(path, None, Some(&self.cancel));
                        if msg_tx.send(IngestMessage::Parsed { path: shown, result }).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(job_rx);
            drop(msg_tx);

            scope.spawn(move || {
                for path in files {
                    if job_tx.send(path.as_path()).is_err() {
                        break;
                    }
                }
            });

            for message in msg_rx {
                on_message(&message);
                if let IngestMessage::Parsed { path, result } = message {
                    reports.push(FileReport { path, result });
                }
            }
        });

        reports.sort_by(|a, b| a.path.cmp(&b.path));
        let report = IngestReport {
            files: reports,
            skipped: 0,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            "Ingested {} file(s): {} entities, {} relationships, {} with errors",
            report.files.len(),
            report.entity_count(),
            report.relationship_count(),
            report.files_with_errors().count()
        );
        report
    }
}
