//! Multi-page worker pool
//!
//! A feeder thread pushes jobs into a bounded channel; `workers` scoped
//! threads pull pages from it and share one pipeline by reference. Results
//! are sent as they complete, so page order is not preserved.

use crate::config::OcrOptions;
use crate::error::OcrError;
use crate::pipeline::{OcrPipeline, PipelineResult};
use crossbeam_channel::{bounded, Sender};
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

/// One page to process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageJob {
    pub page_id: String,
    pub path: PathBuf,
}

impl PageJob {
    /// Job keyed by the file stem of `path`
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let page_id = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { page_id, path }
    }
}

/// Cooperative cancellation flag, checked between pages
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress notifications of a batch run
#[derive(Debug)]
pub enum BatchEvent {
    Page {
        page_id: String,
        outcome: Result<PipelineResult, OcrError>,
    },
    /// Sent exactly once, after the last page
    Finished {
        processed: usize,
        failed: usize,
        cancelled: bool,
    },
}

/// Worker pool running a pipeline over many pages
#[derive(Debug, Clone)]
pub struct BatchRunner {
    workers: usize,
}

impl BatchRunner {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Process `jobs`, reporting to `events`
    ///
    /// Returns once every worker has stopped. Pages already running when
    /// `cancel` fires are finished; no new page is started after that.
    pub fn run(
        &self,
        pipeline: &OcrPipeline,
        jobs: Vec<PageJob>,
        options: &OcrOptions,
        cancel: &CancelToken,
        events: &Sender<BatchEvent>,
    ) {
        let total = jobs.len();
        let processed = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);
        let (job_tx, job_rx) = bounded::<PageJob>(self.workers * 2);

        tracing::info!("Starting batch of {} pages on {} workers", total, self.workers);

        thread::scope(|scope| {
            scope.spawn(move || {
                for job in jobs {
                    if cancel.is_cancelled() || job_tx.send(job).is_err() {
                        break;
                    }
                }
            });

            for _ in 0..self.workers {
                let job_rx = job_rx.clone();
                let (processed, failed) = (&processed, &failed);
                scope.spawn(move || {
                    while let Ok(job) = job_rx.recv() {
                        if cancel.is_cancelled() {
                            break;
                        }

                        let outcome = load_page(&job.path)
                            .and_then(|page| pipeline.run_ocr(&job.page_id, &page, options));
                        processed.fetch_add(1, Ordering::SeqCst);
                        if let Err(e) = &outcome {
                            failed.fetch_add(1, Ordering::SeqCst);
                            tracing::warn!("Page {} failed: {}", job.page_id, e);
                        }

                        let event = BatchEvent::Page {
                            page_id: job.page_id,
                            outcome,
                        };
                        if events.send(event).is_err() {
                            tracing::debug!("Batch event receiver dropped");
                        }
                    }
                });
            }
            drop(job_rx);
        });

        let processed = processed.into_inner();
        let failed = failed.into_inner();
        let cancelled = cancel.is_cancelled() && processed < total;
        tracing::info!(
            "Batch finished: {} of {} pages processed, {} failed{}",
            processed,
            total,
            failed,
            if cancelled { " (cancelled)" } else { "" }
        );

        let _ = events.send(BatchEvent::Finished {
            processed,
            failed,
            cancelled,
        });
    }
}

/// Decode an image file into an RGB page
pub fn load_page(path: &Path) -> Result<RgbImage, OcrError> {
    let image = image::open(path)
        .map_err(|e| OcrError::InvalidInput(format!("cannot decode {}: {}", path.display(), e)))?;
    Ok(image.to_rgb8())
}
