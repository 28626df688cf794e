//! Progress reporting for upload batches.

use std::io::Write;

use crate::upload::{BatchProgress, UploadEvent, UploadEventCallback};

impl BatchProgress {
    /// Batch progress as a percentage (0.0 to 100.0).
    pub fn percent(&self) -> f64 {
        if self.bytes_total == 0 {
            return 0.0;
        }
        (self.bytes_sent as f64 / self.bytes_total as f64) * 100.0
    }

    /// Progress of the current file as a percentage.
    pub fn file_percent(&self) -> f64 {
        let file_sent = self.bytes_sent.saturating_sub(self.bytes_after_file.saturating_sub(self.file_size));
        if self.file_size == 0 {
            return 0.0;
        }
        (file_sent as f64 / self.file_size as f64) * 100.0
    }

    /// Check if every byte of the batch was sent.
    pub fn is_complete(&self) -> bool {
        self.bytes_sent >= self.bytes_total
    }
}

/// Format a byte count with a binary unit, like `1.5 MiB`.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Format an estimated duration in seconds, `--` while unknown.
pub fn human_duration(seconds: f64) -> String {
    if !seconds.is_finite() {
        return "--".to_string();
    }
    let seconds = seconds.round() as u64;
    match (seconds / 3600, seconds / 60 % 60, seconds % 60) {
        (0, 0, s) => format!("{}s", s),
        (0, m, s) => format!("{}m{:02}s", m, s),
        (h, m, _) => format!("{}h{:02}m", h, m),
    }
}

/// Create an upload event callback that draws a progress bar on stdout.
///
/// # Example
/// ```no_run
/// use reposfs::progress::make_progress_bar;
///
/// let callback = make_progress_bar();
/// ```
pub fn make_progress_bar() -> UploadEventCallback {
    Box::new(|event: &UploadEvent| {
        match event {
            UploadEvent::Progress(progress) => {
                let percent = progress.percent();
                let bar_width = 40;
                let filled = ((percent / 100.0 * bar_width as f64) as usize).min(bar_width);
                let empty = bar_width - filled;

                print!(
                    "\r[{}{}] {:.1}% {} ({}/{}) - {}/{} {}/s, {} left",
                    "=".repeat(filled),
                    " ".repeat(empty),
                    percent,
                    progress.file_name,
                    progress.files_sent + 1,
                    progress.files_total,
                    human_size(progress.bytes_sent),
                    human_size(progress.bytes_total),
                    human_size(progress.speed as u64),
                    human_duration(progress.remaining),
                );
            }
            UploadEvent::FileUploaded(item) => {
                println!("\r\x1b[2Kuploaded {}", item.name());
            }
            UploadEvent::Stopped { finished } => {
                println!("{}", if *finished { "upload finished" } else { "upload stopped" });
            }
        }

        let _ = std::io::stdout().flush();
    })
}
