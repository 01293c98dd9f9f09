//! Recovery protocol runs

use macfetch_errors::Error;
use macfetch_events::EventSender;
use macfetch_net::{ProgressCallback, RetryingDownloader};
use macfetch_recovery::{HttpTransport, RecoverySessionClient};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::{OpsCtx, RecoveryRequest, TaskReport};

pub(crate) async fn run(
    ctx: &OpsCtx,
    downloader: RetryingDownloader,
    request: &RecoveryRequest,
    tx: EventSender,
    progress: ProgressCallback,
    cancel: &CancellationToken,
) -> Result<TaskReport, Error> {
    let mut selection = request.selection.clone();
    if selection.mlb.is_none() {
        selection.mlb.clone_from(&ctx.config.recovery.default_mlb);
    }

    let transport = HttpTransport::from_config(downloader, &ctx.config)?;
    let mut client =
        RecoverySessionClient::new(transport, Arc::clone(&ctx.registry), ctx.trusted_keys.clone())
            .with_events(tx)
            .with_progress(progress)
            .verify_chunklists(ctx.config.security.verify_chunklists)
            .allow_unsigned(ctx.config.security.allow_unsigned);

    let artifacts = client.run(&selection, &ctx.download_root(), cancel).await?;
    if artifacts.restarted {
        tracing::debug!(target: "macfetch::ops", board_id = %selection.board_id, "completed after session restart");
    }

    Ok(TaskReport {
        product: artifacts.product,
        image_path: artifacts.image_path,
        chunklist_path: Some(artifacts.chunklist_path),
        bytes: artifacts.download.total_size,
        verified: artifacts.download.verified,
        key_id: artifacts.key_id,
        resumed_from: artifacts.download.resumed_from,
    })
}
