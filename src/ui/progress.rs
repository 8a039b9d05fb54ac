//! Transfer progress with CI fallback

use super::context::UiContext;
use crate::progress::{CancelToken, ProgressMonitor};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress bar for index downloads.
///
/// Shows an indicatif bar in interactive mode and nothing in CI. Cancellation
/// is driven by the shared [`CancelToken`].
pub struct TransferProgress {
    bar: Option<ProgressBar>,
    token: CancelToken,
}

impl TransferProgress {
    pub fn new(ctx: &UiContext, token: CancelToken) -> Self {
        let bar = ctx.use_fancy_output().then(|| {
            let bar = ProgressBar::hidden();
            if let Ok(style) = ProgressStyle::default_bar()
                .template("  {spinner:.cyan} {msg:.dim}  {bar:20.cyan/dim} {bytes}/{total_bytes}  {elapsed:.dim}")
            {
                bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ").progress_chars("━╸─"));
            }
            bar
        });
        Self { bar, token }
    }
}

impl ProgressMonitor for TransferProgress {
    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn begin(&self, task: &str, total: Option<u64>) {
        if let Some(ref bar) = self.bar {
            bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
            bar.reset();
            bar.set_length(total.unwrap_or(0));
            bar.set_message(short_name(task).to_string());
            bar.enable_steady_tick(Duration::from_millis(120));
        }
    }

    fn worked(&self, bytes: u64) {
        if let Some(ref bar) = self.bar {
            bar.inc(bytes);
        }
    }

    fn done(&self) {
        if let Some(ref bar) = self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}

/// Last path segment of a URL, for the bar label
fn short_name(task: &str) -> &str {
    task.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(task)
}
