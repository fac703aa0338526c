use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use updex_diff::{MaterializeOutcome, MaterializeReporter, MaterializeStats};
use updex_manifest::FileEntry;

/// Shows the progress of placing release files into the diff store.
pub struct ProgressReporter {
    progress_bar: ProgressBar,
}

impl ProgressReporter {
    pub fn new(multi_progress: &MultiProgress) -> Self {
        let progress_bar = multi_progress.add(ProgressBar::hidden());
        progress_bar.set_style(
            ProgressStyle::with_template(
                "[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {wide_msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
        );
        Self { progress_bar }
    }
}

impl MaterializeReporter for ProgressReporter {
    fn on_start(&self, total: usize) {
        self.progress_bar.set_length(total as u64);
        self.progress_bar.set_position(0);
    }

    fn on_entry_complete(&self, entry: &FileEntry, outcome: MaterializeOutcome) {
        if outcome.is_skipped() {
            self.progress_bar.set_message(format!(
                "{} ({})",
                style(&entry.relative_path).yellow(),
                outcome
            ));
        } else {
            self.progress_bar.set_message(entry.relative_path.clone());
        }
        self.progress_bar.inc(1);
    }

    fn on_complete(&self, _stats: &MaterializeStats) {
        self.progress_bar.finish_and_clear();
    }
}
