//! The recovery session state machine

use macfetch_boards::BoardRegistry;
use macfetch_chunklist::{check_signature, parse};
use macfetch_errors::{Error, ErrorKind, RecoveryError};
use macfetch_events::{AppEvent, EventEmitter, EventSender, FailureContext, RecoveryEvent};
use macfetch_net::{DownloadOptions, DownloadTask, ProgressCallback};
use macfetch_signing::TrustedKey;
use macfetch_types::{BoardSelection, ImageType, OsType, Product};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::query::ImageQuery;
use crate::session::Session;
use crate::transport::RecoveryTransport;

/// Protocol position of a [`RecoverySessionClient`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    Init,
    SessionAcquired,
    ProductResolved,
    ImageRequested,
    Complete,
    Failed,
}

impl RecoveryState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::SessionAcquired => "session_acquired",
            Self::ProductResolved => "product_resolved",
            Self::ImageRequested => "image_requested",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl fmt::Display for RecoveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Files produced by a completed recovery run
#[derive(Debug, Clone)]
pub struct RecoveryArtifacts {
    pub product: Product,
    pub image_path: PathBuf,
    pub chunklist_path: PathBuf,
    /// Key that verified the chunklist; `None` when it was accepted unsigned
    /// or verification is disabled
    pub key_id: Option<String>,
    pub download: DownloadTask,
    /// The session expired once and the protocol was restarted
    pub restarted: bool,
}

#[derive(Debug, Clone)]
struct Resolution {
    product: Product,
    query: ImageQuery,
}

/// Drives one recovery protocol run: session, product, image
///
/// Steps must be taken in order; a call made in the wrong state is
/// rejected with `RecoveryError::InvalidState` and leaves the state
/// untouched. A failed step moves the client to [`RecoveryState::Failed`],
/// after which only [`RecoverySessionClient::restart_after_expiry`] is
/// accepted, and only once, for an expired session.
pub struct RecoverySessionClient<T> {
    transport: T,
    registry: Arc<BoardRegistry>,
    trusted_keys: Vec<TrustedKey>,
    verify_chunklists: bool,
    allow_unsigned: bool,
    on_progress: Option<ProgressCallback>,
    events: Option<EventSender>,
    state: RecoveryState,
    session: Option<Session>,
    resolution: Option<Resolution>,
    restart_used: bool,
    last_failure: Option<ErrorKind>,
}

impl<T> EventEmitter for RecoverySessionClient<T> {
    fn event_sender(&self) -> Option<&EventSender> {
        self.events.as_ref()
    }
}

impl<T: RecoveryTransport> RecoverySessionClient<T> {
    #[must_use]
    pub fn new(transport: T, registry: Arc<BoardRegistry>, trusted_keys: Vec<TrustedKey>) -> Self {
        Self {
            transport,
            registry,
            trusted_keys,
            verify_chunklists: true,
            allow_unsigned: false,
            on_progress: None,
            events: None,
            state: RecoveryState::Init,
            session: None,
            resolution: None,
            restart_used: false,
            last_failure: None,
        }
    }

    #[must_use]
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    #[must_use]
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// Skip chunklist checks entirely
    #[must_use]
    pub fn verify_chunklists(mut self, verify: bool) -> Self {
        self.verify_chunklists = verify;
        self
    }

    /// Accept digest-only chunklists that carry no signature
    #[must_use]
    pub fn allow_unsigned(mut self, allow: bool) -> Self {
        self.allow_unsigned = allow;
        self
    }

    #[must_use]
    pub fn state(&self) -> RecoveryState {
        self.state
    }

    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn product(&self) -> Option<&Product> {
        self.resolution.as_ref().map(|r| &r.product)
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Obtain a session from the server.
    ///
    /// # Errors
    ///
    /// Returns `RecoveryError::InvalidState` outside `Init`, or the
    /// transport's failure, which also fails the client.
    pub async fn acquire_session(&mut self, cancel: &CancellationToken) -> Result<&Session, Error> {
        self.guard("acquire_session", RecoveryState::Init)?;

        match self.transport.acquire_session(cancel).await {
            Ok(session) => {
                let expires_in = session.expires_in().as_secs();
                tracing::info!(target: "macfetch::recovery", expires_in, "session acquired");
                self.emit(AppEvent::Recovery(RecoveryEvent::SessionAcquired { expires_in }));
                self.state = RecoveryState::SessionAcquired;
                Ok(&*self.session.insert(session))
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Resolve the board to a product and bind the session to it.
    ///
    /// A board missing from the registry is accepted only with
    /// `manual_override`; its product is then named after the board and
    /// the requested OS type. A `latest` recovery image of a registered
    /// board is filed under the version `latest`, apart from the OS the
    /// board shipped with.
    ///
    /// # Errors
    ///
    /// Returns `RecoveryError::InvalidState` outside `SessionAcquired`, or
    /// `RecoveryError::UnknownBoard`.
    pub fn resolve_product(&mut self, selection: &BoardSelection) -> Result<&Product, Error> {
        self.guard("resolve_product", RecoveryState::SessionAcquired)?;

        let image_type = selection.image_type();
        let registered = self
            .registry
            .find(&selection.board_id, image_type)
            .cloned();
        let manual_override = registered.is_none();
        let product = match registered {
            Some(mut product) => {
                if selection.os_type == OsType::Latest && image_type == ImageType::Recovery {
                    product.os_version = OsType::Latest.as_str().to_string();
                }
                product
            }
            None if selection.manual_override => Product::new(
                selection.board_id.clone(),
                selection.os_type.as_str(),
                image_type,
            )
            .with_board(selection.board_id.clone()),
            None => {
                return Err(self.fail(
                    RecoveryError::UnknownBoard {
                        board_id: selection.board_id.clone(),
                    }
                    .into(),
                ))
            }
        };

        if let Some(session) = self.session.as_mut() {
            session.bind_board(&selection.board_id);
        }

        tracing::info!(
            target: "macfetch::recovery",
            board_id = %selection.board_id,
            product = %product.id,
            os_version = %product.os_version,
            manual_override,
            "product resolved"
        );
        self.emit(AppEvent::Recovery(RecoveryEvent::ProductResolved {
            board_id: selection.board_id.clone(),
            product_id: product.id.clone(),
            os_version: product.os_version.clone(),
            manual_override,
        }));

        self.state = RecoveryState::ProductResolved;
        let resolution = self.resolution.insert(Resolution {
            query: ImageQuery::for_selection(selection),
            product,
        });
        Ok(&resolution.product)
    }

    /// Query the image, then fetch and verify the chunklist and the image
    /// into `<destination_root>/<product>/<os version>/<image type>/`.
    ///
    /// # Errors
    ///
    /// Returns `RecoveryError::InvalidState` outside `ProductResolved`,
    /// `RecoveryError::SessionExpired` when the session is no longer
    /// accepted, or any network, signature or integrity failure.
    pub async fn request_image(
        &mut self,
        destination_root: &Path,
        cancel: &CancellationToken,
    ) -> Result<RecoveryArtifacts, Error> {
        self.guard("request_image", RecoveryState::ProductResolved)?;

        match self.fetch_artifacts(destination_root, cancel).await {
            Ok(artifacts) => {
                self.state = RecoveryState::Complete;
                tracing::info!(
                    target: "macfetch::recovery",
                    image = %artifacts.image_path.display(),
                    "recovery image complete"
                );
                self.emit(AppEvent::Recovery(RecoveryEvent::Completed {
                    image_path: artifacts.image_path.display().to_string(),
                    chunklist_path: artifacts.chunklist_path.display().to_string(),
                }));
                Ok(artifacts)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Start over after the session expired. Allowed once per client.
    ///
    /// # Errors
    ///
    /// Returns `RecoveryError::InvalidState` unless the client failed on an
    /// expired session, or `RecoveryError::SessionExpired` if the one
    /// restart was already used.
    pub fn restart_after_expiry(&mut self) -> Result<(), Error> {
        if self.state != RecoveryState::Failed
            || self.last_failure != Some(ErrorKind::SessionExpired)
        {
            return Err(self.invalid_state("restart_after_expiry"));
        }
        if self.restart_used {
            return Err(RecoveryError::SessionExpired.into());
        }

        tracing::info!(target: "macfetch::recovery", "session expired, restarting once");
        self.emit(AppEvent::Recovery(RecoveryEvent::SessionExpired { restarting: true }));
        self.restart_used = true;
        self.session = None;
        self.resolution = None;
        self.last_failure = None;
        self.state = RecoveryState::Init;
        Ok(())
    }

    /// Drive the whole protocol, restarting once if the session expires.
    ///
    /// # Errors
    ///
    /// Returns the first terminal failure; a second session expiry is
    /// `RecoveryError::SessionExpired`.
    pub async fn run(
        &mut self,
        selection: &BoardSelection,
        destination_root: &Path,
        cancel: &CancellationToken,
    ) -> Result<RecoveryArtifacts, Error> {
        self.guard("run", RecoveryState::Init)?;

        loop {
            match self.run_once(selection, destination_root, cancel).await {
                Err(Error::Recovery(RecoveryError::SessionExpired)) if !self.restart_used => {
                    self.restart_after_expiry()?;
                }
                result => return result,
            }
        }
    }

    async fn run_once(
        &mut self,
        selection: &BoardSelection,
        destination_root: &Path,
        cancel: &CancellationToken,
    ) -> Result<RecoveryArtifacts, Error> {
        self.acquire_session(cancel).await?;
        self.resolve_product(selection)?;
        self.request_image(destination_root, cancel).await
    }

    async fn fetch_artifacts(
        &mut self,
        destination_root: &Path,
        cancel: &CancellationToken,
    ) -> Result<RecoveryArtifacts, Error> {
        let (Some(session), Some(resolution)) = (self.session.clone(), self.resolution.clone())
        else {
            return Err(Error::internal("request_image without session or product"));
        };

        if session.is_expired() {
            tracing::debug!(target: "macfetch::recovery", "session expired locally");
            return Err(RecoveryError::SessionExpired.into());
        }

        let info = self
            .transport
            .query_image(&session, &resolution.query, cancel)
            .await?;
        self.state = RecoveryState::ImageRequested;
        tracing::debug!(
            target: "macfetch::recovery",
            product = %info.product,
            image = %info.image_url,
            "image located"
        );
        self.emit(AppEvent::Recovery(RecoveryEvent::ImageRequested {
            image_url: info.image_url.clone(),
            chunklist_url: info.chunklist_url.clone(),
        }));

        let product = resolution.product;
        let dir = destination_root.join(product.relative_dir());
        let image_path = dir.join(info.image_file_name(product.image_type));
        let chunklist_path = dir.join(info.chunklist_file_name(product.image_type));

        let chunklist_bytes = self.transport.fetch_chunklist(&info, cancel).await?;
        let mut options = DownloadOptions::new();
        options.on_progress.clone_from(&self.on_progress);
        let mut key_id = None;
        if self.verify_chunklists {
            let chunklist = parse(&chunklist_bytes)?;
            key_id = check_signature(
                &chunklist,
                &chunklist_path,
                &self.trusted_keys,
                self.allow_unsigned,
                &*self,
            )?;
            options = options.with_chunklist(Arc::new(chunklist));
        } else {
            tracing::warn!(target: "macfetch::recovery", "chunklist verification disabled");
            self.emit_warning("chunklist verification disabled; image is not authenticated");
        }

        // held until the image is in place
        let _chunklist_claim = self
            .transport
            .store_chunklist(&chunklist_path, &chunklist_bytes)
            .await?;
        let download = self
            .transport
            .download_image(&info, &image_path, options, cancel)
            .await?;

        Ok(RecoveryArtifacts {
            product,
            image_path,
            chunklist_path,
            key_id,
            download,
            restarted: self.restart_used,
        })
    }

    fn guard(&self, operation: &str, expected: RecoveryState) -> Result<(), Error> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.invalid_state(operation))
        }
    }

    fn invalid_state(&self, operation: &str) -> Error {
        RecoveryError::InvalidState {
            operation: operation.to_string(),
            state: self.state.to_string(),
        }
        .into()
    }

    fn fail(&mut self, error: Error) -> Error {
        let state = self.state;
        self.state = RecoveryState::Failed;
        self.last_failure = Some(error.kind());

        match &error {
            Error::Cancelled => {
                tracing::info!(target: "macfetch::recovery", %state, "recovery cancelled");
            }
            Error::Recovery(RecoveryError::SessionExpired) if !self.restart_used => {
                tracing::info!(target: "macfetch::recovery", %state, "session expired");
            }
            _ => {
                if matches!(error, Error::Recovery(RecoveryError::SessionExpired)) {
                    self.emit(AppEvent::Recovery(RecoveryEvent::SessionExpired {
                        restarting: false,
                    }));
                }
                tracing::warn!(target: "macfetch::recovery", %state, error = %error, "recovery failed");
                self.emit(AppEvent::Recovery(RecoveryEvent::Failed {
                    state: state.to_string(),
                    failure: FailureContext::from_error(&error),
                }));
            }
        }
        error
    }
}
