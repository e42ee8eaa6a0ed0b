use crate::pipeline::{IngestMessage, IngestReport};
use crate::ui::{Icons, theme};
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::path::Path;
use std::time::Duration;

/// Progress bar for one ingestion run, hidden when stdout is not a terminal
pub struct IngestProgress {
    bar: ProgressBar,
}

impl IngestProgress {
    pub fn new(total_files: usize) -> Self {
        let bar = if console::Term::stdout().is_term() {
            ProgressBar::new(total_files as u64)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {wide_msg}") {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    /// Feed one pipeline message
    pub fn handle(&self, message: &IngestMessage) {
        match message {
            IngestMessage::Started { path } => {
                let name = Path::new(path)
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| path.clone());
                self.bar.set_message(format!("Parsing: {}", name));
            }
            IngestMessage::Parsed { .. } => self.bar.inc(1),
        }
    }

    pub fn finish_with_summary(&self, report: &IngestReport) {
        self.bar.finish_and_clear();
        println!();
        println!(
            "{} {}",
            Icons::CHECK.style(theme().success.clone()),
            format!("Complete in {}", HumanDuration(report.elapsed)).style(theme().success.clone())
        );
        println!(
            "  {} {}  {} {}  {} {}",
            Icons::FILE.style(theme().info.clone()),
            report.files.len(),
            Icons::PACKAGE.style(theme().info.clone()),
            report.entity_count(),
            Icons::LINK.style(theme().info.clone()),
            report.relationship_count()
        );
    }
}
