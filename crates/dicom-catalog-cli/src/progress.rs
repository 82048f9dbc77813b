use dicom_catalog_core::ProgressSink;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;

/// CLI progress sink using a single indicatif bar over the schedule's
/// global step range; phase names appear as the bar message.
pub struct BarSink {
    bar: Mutex<Option<ProgressBar>>,
}

impl BarSink {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    pub fn finish(&self) {
        let mut guard = self.bar.lock().unwrap();
        if let Some(bar) = guard.take() {
            bar.finish_and_clear();
        }
    }
}

impl ProgressSink for BarSink {
    fn on_phase_start(&self, name: &str) {
        let mut guard = self.bar.lock().unwrap();
        let bar = guard.get_or_insert_with(|| {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::with_template(
                    "  {spinner:.cyan} {msg:>10} [{bar:30.cyan/dim}] {pos}/{len}",
                )
                .unwrap()
                .progress_chars("━╸─")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
            );
            bar.enable_steady_tick(std::time::Duration::from_millis(80));
            bar
        });
        bar.set_message(name.to_string());
    }

    fn on_position(&self, position: f64, display_steps: f64) {
        let guard = self.bar.lock().unwrap();
        if let Some(bar) = guard.as_ref() {
            if bar.length() != Some(display_steps as u64) {
                bar.set_length(display_steps as u64);
            }
            bar.set_position(position.round() as u64);
        }
    }

    fn on_phase_complete(&self, name: &str, duration_secs: f64) {
        eprintln!(
            "  \x1b[32m✓\x1b[0m {} complete in {:.2}s",
            name, duration_secs
        );
    }
}

impl Default for BarSink {
    fn default() -> Self {
        Self::new()
    }
}
