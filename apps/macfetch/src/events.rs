//! Event handling and progress display

use console::{Style, Term};
use macfetch_events::{
    AppEvent, DownloadEvent, EventMessage, GeneralEvent, RecoveryEvent, TaskEvent,
    VerificationEvent,
};
use macfetch_types::TaskId;
use std::collections::HashMap;

use crate::display::format_bytes;

/// Percentage steps between progress lines
const PROGRESS_STEP: u64 = 5;

/// Renders bus events for the user on stderr
pub struct EventHandler {
    term: Term,
    /// Forward every event to tracing
    debug: bool,
    /// Suppress human output (JSON mode)
    quiet: bool,
    ok: Style,
    warn: Style,
    err: Style,
    dim: Style,
    /// Last percentage printed per task
    progress: HashMap<TaskId, u64>,
}

impl EventHandler {
    pub fn new(debug: bool, quiet: bool) -> Self {
        let term = Term::stderr();
        let colors = term.features().colors_supported();
        let style = |s: Style| if colors { s } else { Style::new() };
        Self {
            term,
            debug,
            quiet,
            ok: style(Style::new().green()),
            warn: style(Style::new().yellow()),
            err: style(Style::new().red().bold()),
            dim: style(Style::new().dim()),
            progress: HashMap::new(),
        }
    }

    /// Handle incoming event
    pub fn handle_event(&mut self, message: EventMessage) {
        if self.debug {
            crate::logging::log_event_with_tracing(&message);
        }
        if self.quiet {
            return;
        }

        match message.event {
            AppEvent::Task(event) => self.handle_task_event(event),
            AppEvent::Download(event) => self.handle_download_event(event),
            AppEvent::Recovery(event) => self.handle_recovery_event(event),
            AppEvent::Verification(event) => self.handle_verification_event(event),
            AppEvent::General(event) => match event {
                GeneralEvent::Warning { message, .. } => self.show_warning(&message),
                GeneralEvent::Error { message, .. } => self.show_error(&message),
                GeneralEvent::OperationFailed { operation, error } => {
                    self.show_error(&format!("{operation}: {error}"));
                }
                _ => {}
            },
        }
    }

    fn handle_task_event(&mut self, event: TaskEvent) {
        match event {
            TaskEvent::Started { description, .. } => {
                self.show_status(&format!("Starting {description}"));
            }
            TaskEvent::Progress {
                task_id,
                bytes_transferred,
                total_bytes,
            } => self.show_progress(task_id, bytes_transferred, total_bytes),
            TaskEvent::Finished { task_id, outcome } => {
                self.progress.remove(&task_id);
                if outcome.success {
                    let suffix = if outcome.verified { "verified" } else { "not verified" };
                    self.show_success(&format!("Finished ({suffix})"));
                }
            }
        }
    }

    fn handle_download_event(&mut self, event: DownloadEvent) {
        match event {
            DownloadEvent::Started {
                url, resumed_from, ..
            } if resumed_from > 0 => {
                self.show_status(&format!(
                    "Downloading {url} (resuming at {})",
                    format_bytes(resumed_from)
                ));
            }
            DownloadEvent::Started { url, .. } => {
                self.show_status(&format!("Downloading {url}"));
            }
            DownloadEvent::Restarted { reason, .. } => {
                self.show_warning(&format!("Restarting download: {reason}"));
            }
            DownloadEvent::Retrying {
                attempt,
                max_attempts,
                delay,
                reason,
                ..
            } => self.show_warning(&format!(
                "{reason}; retry {attempt}/{} in {:.1}s",
                max_attempts.saturating_sub(1),
                delay.as_secs_f64()
            )),
            DownloadEvent::Cancelled { bytes_on_disk, .. } => self.show_warning(&format!(
                "Download cancelled; {} kept for resume",
                format_bytes(bytes_on_disk)
            )),
            _ => {}
        }
    }

    fn handle_recovery_event(&mut self, event: RecoveryEvent) {
        match event {
            RecoveryEvent::ProductResolved {
                board_id,
                product_id,
                os_version,
                manual_override,
            } => {
                let note = if manual_override { " (manual override)" } else { "" };
                self.show_status(&format!(
                    "{board_id} resolves to {product_id} {os_version}{note}"
                ));
            }
            RecoveryEvent::SessionExpired { restarting: true } => {
                self.show_warning("Recovery session expired, starting a new one");
            }
            _ => {}
        }
    }

    fn handle_verification_event(&mut self, event: VerificationEvent) {
        match event {
            VerificationEvent::SignatureVerified {
                key_id: Some(key_id),
                chunk_count,
            } => self.show_status(&format!(
                "Chunklist signed by {key_id} ({chunk_count} chunks)"
            )),
            VerificationEvent::SignatureVerified { key_id: None, .. } => {
                self.show_warning("Chunklist is unsigned; accepted by configuration");
            }
            VerificationEvent::PrefixVerified {
                verified_len,
                chunks_verified,
            } if verified_len > 0 => self.show_status(&format!(
                "Partial file verified: {chunks_verified} chunks, {}",
                format_bytes(verified_len)
            )),
            VerificationEvent::Failed { path, failure } => {
                self.show_error(&format!("Verification failed for {path}: {}", failure.message));
            }
            _ => {}
        }
    }

    fn show_progress(&mut self, task_id: TaskId, bytes: u64, total: Option<u64>) {
        let Some(total) = total.filter(|t| *t > 0) else {
            return;
        };
        let percent = bytes.saturating_mul(100) / total;
        let last = self.progress.get(&task_id).copied();
        if last.is_some_and(|last| percent < last + PROGRESS_STEP && percent < 100) {
            return;
        }
        if last == Some(100) {
            return;
        }
        self.progress.insert(task_id, percent);
        let line = format!(
            "  {percent:>3}%  {} / {}",
            format_bytes(bytes),
            format_bytes(total)
        );
        let _ = self.term.write_line(&self.dim.apply_to(line).to_string());
    }

    fn show_status(&self, message: &str) {
        let _ = self.term.write_line(message);
    }

    fn show_success(&self, message: &str) {
        let _ = self.term.write_line(&self.ok.apply_to(message).to_string());
    }

    fn show_warning(&self, message: &str) {
        let _ = self
            .term
            .write_line(&self.warn.apply_to(format!("warning: {message}")).to_string());
    }

    fn show_error(&self, message: &str) {
        let _ = self
            .term
            .write_line(&self.err.apply_to(format!("error: {message}")).to_string());
    }

    /// Print a notice outside the event stream
    pub fn notice(&self, message: &str) {
        if !self.quiet {
            self.show_warning(message);
        }
    }
}
