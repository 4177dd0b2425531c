//! Per-worker download progress bars.
//!
//! The reporter is created once per run and handed to the file download
//! primitive together with the id of the worker doing the transfer.

use std::fmt;

use dashmap::DashMap;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Identifier of the worker performing a transfer.
///
/// Worker `0` is the calling task when the run is not parallel.
pub type WorkerId = usize;

const BAR_TEMPLATE: &str =
    "{prefix:>10} [{bar:30}] {bytes}/{total_bytes} ({bytes_per_sec}) {wide_msg}";
const SPINNER_TEMPLATE: &str = "{prefix:>10} {spinner} {bytes} ({bytes_per_sec}) {wide_msg}";

/// Renders one progress line per active worker.
pub struct ProgressReporter {
    multi: MultiProgress,
    bars: DashMap<WorkerId, ProgressBar>,
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("active", &self.bars.len())
            .finish_non_exhaustive()
    }
}

impl ProgressReporter {
    /// Creates a reporter drawing to stderr.
    #[must_use]
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    /// Creates a reporter that draws nothing (quiet mode, tests).
    #[must_use]
    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        Self {
            multi: MultiProgress::with_draw_target(target),
            bars: DashMap::new(),
        }
    }

    /// Starts (or restarts) the progress line of `worker`.
    pub fn start(&self, worker: WorkerId, label: &str, total_bytes: Option<u64>) {
        let bar = match total_bytes {
            Some(total) => {
                let bar = ProgressBar::new(total);
                bar.set_style(
                    ProgressStyle::with_template(BAR_TEMPLATE)
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("=> "),
                );
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(
                    ProgressStyle::with_template(SPINNER_TEMPLATE)
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                bar
            }
        };
        let bar = self.multi.add(bar);
        bar.set_prefix(worker_label(worker));
        bar.set_message(label.to_string());
        if let Some(previous) = self.bars.insert(worker, bar) {
            previous.finish_and_clear();
            self.multi.remove(&previous);
        }
    }

    /// Records `bytes` more bytes for `worker`.
    pub fn advance(&self, worker: WorkerId, bytes: u64) {
        if let Some(bar) = self.bars.get(&worker) {
            bar.inc(bytes);
        }
    }

    /// Returns the bytes recorded so far for `worker`, if it has a line.
    #[must_use]
    pub fn position(&self, worker: WorkerId) -> Option<u64> {
        self.bars.get(&worker).map(|bar| bar.position())
    }

    /// Removes the progress line of `worker`.
    pub fn finish(&self, worker: WorkerId) {
        if let Some((_, bar)) = self.bars.remove(&worker) {
            bar.finish_and_clear();
            self.multi.remove(&bar);
        }
    }

    /// Number of workers with an active progress line.
    #[must_use]
    pub fn active(&self) -> usize {
        self.bars.len()
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn worker_label(worker: WorkerId) -> String {
    if worker == 0 {
        "main".to_string()
    } else {
        format!("worker-{worker}")
    }
}
