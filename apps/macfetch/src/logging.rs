//! Structured logging integration for events
//!
//! Every bus event is re-emitted as a `tracing` record at the level its
//! metadata carries, with the task correlation id attached, so the JSON
//! debug log holds the full event history of a run.

use macfetch_events::{
    AppEvent, DownloadEvent, EventMessage, GeneralEvent, RecoveryEvent, TaskEvent,
    VerificationEvent,
};
use tracing::Level;

macro_rules! log_at {
    ($level:expr, $($arg:tt)+) => {{
        let level = $level;
        if level == Level::ERROR {
            tracing::error!(target: "macfetch::events", $($arg)+);
        } else if level == Level::WARN {
            tracing::warn!(target: "macfetch::events", $($arg)+);
        } else if level == Level::INFO {
            tracing::info!(target: "macfetch::events", $($arg)+);
        } else if level == Level::DEBUG {
            tracing::debug!(target: "macfetch::events", $($arg)+);
        } else {
            tracing::trace!(target: "macfetch::events", $($arg)+);
        }
    }};
}

/// Log an event using the tracing infrastructure with structured fields
pub fn log_event_with_tracing(message: &EventMessage) {
    let meta = &message.meta;
    let level = meta.tracing_level();
    let source = meta.source.as_str();
    let correlation = meta.correlation_id.as_deref().unwrap_or("-");

    match &message.event {
        AppEvent::Download(event) => match event {
            DownloadEvent::Started {
                url,
                total_bytes,
                resumed_from,
            } => log_at!(level, source, correlation, url = %url, total_bytes = ?total_bytes, resumed_from, "Download started"),
            DownloadEvent::Resuming {
                url,
                verified_len,
                on_disk,
            } => log_at!(level, source, correlation, url = %url, verified_len, on_disk, "Resuming download"),
            DownloadEvent::Restarted { url, reason } => {
                log_at!(level, source, correlation, url = %url, reason = %reason, "Download restarted");
            }
            DownloadEvent::Retrying {
                url,
                attempt,
                max_attempts,
                delay,
                reason,
            } => log_at!(level, source, correlation, url = %url, attempt, max_attempts, delay = ?delay, reason = %reason, "Retrying"),
            DownloadEvent::Progress {
                url,
                bytes_transferred,
                total_bytes,
            } => log_at!(level, source, correlation, url = %url, bytes_transferred, total_bytes = ?total_bytes, "Download progress"),
            DownloadEvent::Completed {
                url,
                bytes,
                elapsed,
                verified,
            } => log_at!(level, source, correlation, url = %url, bytes, elapsed = ?elapsed, verified, "Download completed"),
            DownloadEvent::Cancelled { url, bytes_on_disk } => {
                log_at!(level, source, correlation, url = %url, bytes_on_disk, "Download cancelled");
            }
            DownloadEvent::Failed { url, failure } => log_at!(
                level,
                source,
                correlation,
                url = %url,
                code = ?failure.code,
                retryable = failure.retryable,
                message = %failure.message,
                "Download failed"
            ),
        },

        AppEvent::Verification(event) => match event {
            VerificationEvent::SignatureVerified {
                key_id,
                chunk_count,
            } => log_at!(level, source, correlation, key_id = ?key_id, chunk_count, "Chunklist signature accepted"),
            VerificationEvent::PrefixVerified {
                verified_len,
                chunks_verified,
            } => log_at!(level, source, correlation, verified_len, chunks_verified, "Partial file verified"),
            VerificationEvent::ChunkVerified {
                chunk_index,
                offset,
            } => log_at!(level, source, correlation, chunk_index, offset, "Chunk verified"),
            VerificationEvent::PayloadVerified {
                path,
                bytes,
                chunks,
            } => log_at!(level, source, correlation, path = %path, bytes, chunks, "Payload verified"),
            VerificationEvent::Failed { path, failure } => log_at!(
                level,
                source,
                correlation,
                path = %path,
                code = ?failure.code,
                message = %failure.message,
                "Verification failed"
            ),
        },

        AppEvent::Recovery(event) => match event {
            RecoveryEvent::SessionAcquired { expires_in } => {
                log_at!(level, source, correlation, expires_in, "Session acquired");
            }
            RecoveryEvent::ProductResolved {
                board_id,
                product_id,
                os_version,
                manual_override,
            } => log_at!(level, source, correlation, board_id = %board_id, product_id = %product_id, os_version = %os_version, manual_override, "Product resolved"),
            RecoveryEvent::ImageRequested {
                image_url,
                chunklist_url,
            } => log_at!(level, source, correlation, image_url = %image_url, chunklist_url = %chunklist_url, "Image requested"),
            RecoveryEvent::SessionExpired { restarting } => {
                log_at!(level, source, correlation, restarting, "Session expired");
            }
            RecoveryEvent::Completed {
                image_path,
                chunklist_path,
            } => log_at!(level, source, correlation, image_path = %image_path, chunklist_path = %chunklist_path, "Recovery complete"),
            RecoveryEvent::Failed { state, failure } => log_at!(
                level,
                source,
                correlation,
                state = %state,
                code = ?failure.code,
                message = %failure.message,
                "Recovery failed"
            ),
        },

        AppEvent::Task(event) => match event {
            TaskEvent::Started {
                task_id,
                description,
            } => log_at!(level, source, task_id = %task_id, description = %description, "Task started"),
            TaskEvent::Progress {
                task_id,
                bytes_transferred,
                total_bytes,
            } => log_at!(level, source, task_id = %task_id, bytes_transferred, total_bytes = ?total_bytes, "Task progress"),
            TaskEvent::Finished { task_id, outcome } => log_at!(
                level,
                source,
                task_id = %task_id,
                success = outcome.success,
                verified = outcome.verified,
                error_kind = ?outcome.error_kind,
                detail = %outcome.detail,
                "Task finished"
            ),
        },

        AppEvent::General(event) => match event {
            GeneralEvent::Warning { message, context } => {
                log_at!(level, source, correlation, context = ?context, "{message}");
            }
            GeneralEvent::Error { message, details } => {
                log_at!(level, source, correlation, details = ?details, "{message}");
            }
            GeneralEvent::DebugLog { message, context } => {
                log_at!(level, source, correlation, context = ?context, "{message}");
            }
            GeneralEvent::OperationStarted { operation } => {
                log_at!(level, source, correlation, operation = %operation, "Operation started");
            }
            GeneralEvent::OperationCompleted { operation, success } => {
                log_at!(level, source, correlation, operation = %operation, success, "Operation completed");
            }
            GeneralEvent::OperationFailed { operation, error } => {
                log_at!(level, source, correlation, operation = %operation, error = %error, "Operation failed");
            }
        },
    }
}
