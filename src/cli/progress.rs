use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use gainsledger::progress::ProgressEvent;

/// Renders pipeline progress events on stderr.
///
/// Transient lines and steps share one spinner; persisted lines are printed
/// above it and stay in the scrollback.
pub struct ProgressPrinter {
    bar: Option<ProgressBar>,
    quiet: bool,
}

impl ProgressPrinter {
    pub fn new(quiet: bool) -> Self {
        Self { bar: None, quiet }
    }

    fn spinner(&mut self) -> &ProgressBar {
        self.bar.get_or_insert_with(|| {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        })
    }

    pub fn update(&mut self, text: &str) {
        if self.quiet {
            return;
        }
        self.spinner().set_message(text.to_string());
    }

    pub fn persist(&mut self, text: &str) {
        if self.quiet {
            return;
        }
        match &self.bar {
            Some(pb) => pb.println(text),
            None => eprintln!("{}", text),
        }
    }

    pub fn on_event(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::Line { text, persist: true } => self.persist(&text),
            ProgressEvent::Line { text, persist: false } => self.update(&text),
            ProgressEvent::Step { label, current, total } => {
                self.update(&format!("{} {}/{}", label, current, total))
            }
        }
    }

    pub fn finish(&mut self) {
        if let Some(pb) = self.bar.take() {
            pb.finish_and_clear();
        }
    }
}

impl Drop for ProgressPrinter {
    fn drop(&mut self) {
        self.finish();
    }
}
