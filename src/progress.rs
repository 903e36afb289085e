use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Overall file progress, plus one transient bar per file being OCR'd.
#[derive(Clone)]
pub struct ProgressTracker {
    multi: MultiProgress,
    bar: ProgressBar,
    completed: Arc<AtomicUsize>,
}

impl ProgressTracker {
    pub fn new(total: usize, visible: bool) -> Self {
        let multi = if visible {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };

        let bar = multi.add(ProgressBar::new(total as u64));
        bar.set_style(style(
            "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        ));
        bar.set_message("Processing PDFs...");

        Self {
            multi,
            bar,
            completed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Bar for the pages of a single file; only advances if OCR runs
    pub fn page_bar(&self, name: &str) -> ProgressBar {
        let bar = self.multi.add(ProgressBar::new(0));
        bar.set_style(style("  {prefix:.bold} [{bar:30.yellow/blue}] {pos}/{len} {msg}"));
        bar.set_prefix(name.to_string());
        bar
    }

    pub fn increment(&self) {
        let count = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        self.bar.set_position(count as u64);
        self.bar.set_message(format!("Processed {} files", count));
    }

    pub fn finish(&self) {
        self.bar.finish_with_message("✅ All files processed!");
    }
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}
