//! Direct installer downloads through the verified pipeline

use macfetch_chunklist::{check_signature, parse};
use macfetch_errors::Error;
use macfetch_events::{EventEmitter, EventSender};
use macfetch_net::{DownloadOptions, ProgressCallback, RetryingDownloader};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{InstallerRequest, OpsCtx, TaskReport};

const DEFAULT_PAYLOAD_NAME: &str = "InstallAssistant.pkg";

pub(crate) async fn run(
    ctx: &OpsCtx,
    downloader: &RetryingDownloader,
    request: &InstallerRequest,
    tx: &EventSender,
    progress: ProgressCallback,
    cancel: &CancellationToken,
) -> Result<TaskReport, Error> {
    let url = macfetch_net::parse_url(&request.url)?;
    let file_name = request
        .file_name
        .clone()
        .or_else(|| last_segment(&url))
        .unwrap_or_else(|| DEFAULT_PAYLOAD_NAME.to_string());

    let dir = ctx.download_root().join(request.product.relative_dir());
    let image_path = dir.join(&file_name);

    let mut options = DownloadOptions::new();
    options.on_progress = Some(progress);
    let mut key_id = None;
    let mut chunklist_path = None;

    let chunklist_claim = if let Some(chunklist_url) = &request.chunklist_url {
        let parsed = macfetch_net::parse_url(chunklist_url)?;
        let path = dir.join(last_segment(&parsed).unwrap_or_else(|| chunklist_name(&file_name)));
        let bytes = downloader.fetch_bytes(chunklist_url, &[], cancel).await?;

        if ctx.config.security.verify_chunklists {
            let chunklist = parse(&bytes)?;
            key_id = check_signature(
                &chunklist,
                &path,
                &ctx.trusted_keys,
                ctx.config.security.allow_unsigned,
                tx,
            )?;
            options = options.with_chunklist(Arc::new(chunklist));
        } else {
            tracing::warn!(target: "macfetch::ops", "chunklist verification disabled");
            tx.emit_warning("chunklist verification disabled; payload is not authenticated");
        }
        let claim = downloader.store(&path, &bytes).await?;
        chunklist_path = Some(path);
        Some(claim)
    } else {
        tracing::warn!(target: "macfetch::ops", url = %url, "no chunklist for payload");
        tx.emit_warning(format!("{file_name} has no chunklist and cannot be verified"));
        None
    };

    let download = downloader
        .download(&request.url, &image_path, &options, cancel)
        .await?;
    drop(chunklist_claim);

    Ok(TaskReport {
        product: request.product.clone(),
        image_path,
        chunklist_path,
        bytes: download.total_size,
        verified: download.verified,
        key_id,
        resumed_from: download.resumed_from,
    })
}

fn last_segment(url: &Url) -> Option<String> {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

fn chunklist_name(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    format!("{stem}.chunklist")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_come_from_the_url() {
        let url = Url::parse("https://swcdn.example.invalid/a/b/InstallAssistant.pkg").unwrap();
        assert_eq!(last_segment(&url).as_deref(), Some("InstallAssistant.pkg"));

        let bare = Url::parse("https://swcdn.example.invalid/").unwrap();
        assert_eq!(last_segment(&bare), None);
    }

    #[test]
    fn chunklist_name_follows_payload() {
        assert_eq!(chunklist_name("InstallAssistant.pkg"), "InstallAssistant.chunklist");
        assert_eq!(chunklist_name("payload"), "payload.chunklist");
    }
}
