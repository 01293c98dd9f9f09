use async_trait::async_trait;
use macfetch_boards::BoardRegistry;
use macfetch_chunklist::{verify_payload, ChunklistBuilder};
use macfetch_errors::{Error, RecoveryError, SigningError, TaskError};
use macfetch_events::{AppEvent, RecoveryEvent};
use macfetch_net::{DestinationClaim, DestinationRegistry, DownloadOptions, DownloadTask};
use macfetch_recovery::{
    ImageInfo, ImageQuery, RecoverySessionClient, RecoveryState, RecoveryTransport, Session,
};
use macfetch_types::{BoardSelection, OsType, TaskStatus};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const BOARD: &str = "Mac-E43C1C25D4880AD6";

const DATASET: &str = r#"{
    "version": 1,
    "products": [
        {"id": "monterey", "os_version": "12", "image_type": "recovery",
         "board_ids": ["Mac-E43C1C25D4880AD6"]}
    ]
}"#;

#[derive(Default)]
struct Calls {
    acquire: AtomicUsize,
    query: AtomicUsize,
    fetch: AtomicUsize,
    download: AtomicUsize,
}

/// Transport answering from scripted queues
struct ScriptedTransport {
    sessions: Mutex<VecDeque<Result<Session, Error>>>,
    queries: Mutex<VecDeque<Result<ImageInfo, Error>>>,
    chunklist: Vec<u8>,
    payload: Vec<u8>,
    calls: Arc<Calls>,
    claims: DestinationRegistry,
}

impl ScriptedTransport {
    fn new(signed: bool) -> Self {
        let payload: Vec<u8> = (0..4096u32).map(|i| (i % 253) as u8).collect();
        let builder = ChunklistBuilder::new().chunk_size(1024);
        let chunklist = if signed {
            builder
                .build_signed(&payload, |_| Ok(vec![0x5A; 256]))
                .unwrap()
        } else {
            builder.build_unsigned(&payload).unwrap()
        };
        Self {
            sessions: Mutex::new(VecDeque::new()),
            queries: Mutex::new(VecDeque::new()),
            chunklist: chunklist.to_bytes(),
            payload,
            calls: Arc::new(Calls::default()),
            claims: DestinationRegistry::new(),
        }
    }

    fn session(self, result: Result<Session, Error>) -> Self {
        self.sessions.lock().unwrap().push_back(result);
        self
    }

    fn query(self, result: Result<ImageInfo, Error>) -> Self {
        self.queries.lock().unwrap().push_back(result);
        self
    }
}

fn fresh_session() -> Result<Session, Error> {
    Ok(Session::new("tok", Duration::from_secs(600)))
}

fn image_info() -> Result<ImageInfo, Error> {
    Ok(ImageInfo {
        product: "041-12345".into(),
        image_url: "https://oscdn.example/041-12345/BaseSystem.dmg".into(),
        image_hash: "AA".into(),
        image_token: "at".into(),
        chunklist_url: "https://oscdn.example/041-12345/BaseSystem.chunklist".into(),
        chunklist_hash: "BB".into(),
        chunklist_token: "ct".into(),
    })
}

fn expired() -> Result<ImageInfo, Error> {
    Err(RecoveryError::SessionExpired.into())
}

#[async_trait]
impl RecoveryTransport for ScriptedTransport {
    async fn acquire_session(&self, _cancel: &CancellationToken) -> Result<Session, Error> {
        self.calls.acquire.fetch_add(1, Ordering::SeqCst);
        self.sessions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::internal("no scripted session")))
    }

    async fn query_image(
        &self,
        session: &Session,
        query: &ImageQuery,
        _cancel: &CancellationToken,
    ) -> Result<ImageInfo, Error> {
        self.calls.query.fetch_add(1, Ordering::SeqCst);
        assert_eq!(session.board_id(), Some(query.board_id.as_str()));
        self.queries
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::internal("no scripted query")))
    }

    async fn fetch_chunklist(
        &self,
        _info: &ImageInfo,
        _cancel: &CancellationToken,
    ) -> Result<Vec<u8>, Error> {
        self.calls.fetch.fetch_add(1, Ordering::SeqCst);
        Ok(self.chunklist.clone())
    }

    async fn store_chunklist(
        &self,
        destination: &Path,
        bytes: &[u8],
    ) -> Result<DestinationClaim, Error> {
        let claim = self.claims.claim(destination)?;
        tokio::fs::create_dir_all(destination.parent().unwrap()).await?;
        tokio::fs::write(destination, bytes).await?;
        Ok(claim)
    }

    async fn download_image(
        &self,
        info: &ImageInfo,
        destination: &Path,
        options: DownloadOptions,
        cancel: &CancellationToken,
    ) -> Result<DownloadTask, Error> {
        self.calls.download.fetch_add(1, Ordering::SeqCst);
        if let Some(chunklist) = &options.chunklist {
            verify_payload(chunklist, self.payload.as_slice(), 0, cancel).await?;
        }
        tokio::fs::write(destination, &self.payload).await?;
        Ok(DownloadTask {
            url: info.image_url.clone(),
            destination: destination.to_path_buf(),
            resumed_from: 0,
            retries: 0,
            status: TaskStatus::Completed,
            bytes_fetched: self.payload.len() as u64,
            total_size: self.payload.len() as u64,
            verified: options.chunklist.is_some(),
        })
    }
}

fn client(transport: ScriptedTransport) -> RecoverySessionClient<ScriptedTransport> {
    let registry = Arc::new(BoardRegistry::from_json(DATASET).unwrap());
    RecoverySessionClient::new(transport, registry, Vec::new()).allow_unsigned(true)
}

#[tokio::test]
async fn full_run_lands_in_product_tree() {
    let transport = ScriptedTransport::new(false)
        .session(fresh_session())
        .query(image_info());
    let calls = Arc::clone(&transport.calls);
    let dir = tempfile::tempdir().unwrap();
    let mut client = client(transport);

    let artifacts = client
        .run(&BoardSelection::new(BOARD), dir.path(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(client.state(), RecoveryState::Complete);
    assert_eq!(
        artifacts.image_path,
        dir.path().join("monterey/12/recovery/BaseSystem.dmg")
    );
    assert!(artifacts.chunklist_path.exists());
    assert!(artifacts.download.verified);
    assert!(!artifacts.restarted);
    assert_eq!(artifacts.key_id, None);
    assert_eq!(calls.acquire.load(Ordering::SeqCst), 1);
    assert_eq!(calls.download.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rejected_session_stops_before_any_request() {
    let transport = ScriptedTransport::new(false).session(Err(RecoveryError::Auth {
        reason: "forbidden".into(),
    }
    .into()));
    let calls = Arc::clone(&transport.calls);
    let dir = tempfile::tempdir().unwrap();
    let mut client = client(transport);

    let err = client
        .run(&BoardSelection::new(BOARD), dir.path(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Recovery(RecoveryError::Auth { .. })));
    assert_eq!(client.state(), RecoveryState::Failed);
    assert_eq!(calls.acquire.load(Ordering::SeqCst), 1);
    assert_eq!(calls.query.load(Ordering::SeqCst), 0);
    assert_eq!(calls.download.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn one_expiry_restarts_exactly_once() {
    let transport = ScriptedTransport::new(false)
        .session(fresh_session())
        .session(fresh_session())
        .query(expired())
        .query(image_info());
    let calls = Arc::clone(&transport.calls);
    let (tx, mut rx) = macfetch_events::channel();
    let dir = tempfile::tempdir().unwrap();
    let mut client = client(transport).with_events(tx);

    let artifacts = client
        .run(&BoardSelection::new(BOARD), dir.path(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(artifacts.restarted);
    assert_eq!(calls.acquire.load(Ordering::SeqCst), 2);
    assert_eq!(calls.query.load(Ordering::SeqCst), 2);

    let mut restarts = 0;
    while let Ok(message) = rx.try_recv() {
        if let AppEvent::Recovery(RecoveryEvent::SessionExpired { restarting }) = message.event {
            assert!(restarting);
            restarts += 1;
        }
    }
    assert_eq!(restarts, 1);
}

#[tokio::test]
async fn second_expiry_is_surfaced() {
    let transport = ScriptedTransport::new(false)
        .session(fresh_session())
        .session(fresh_session())
        .session(fresh_session())
        .query(expired())
        .query(expired())
        .query(image_info());
    let calls = Arc::clone(&transport.calls);
    let dir = tempfile::tempdir().unwrap();
    let mut client = client(transport);

    let err = client
        .run(&BoardSelection::new(BOARD), dir.path(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Recovery(RecoveryError::SessionExpired)));
    assert_eq!(client.state(), RecoveryState::Failed);
    assert_eq!(calls.acquire.load(Ordering::SeqCst), 2);
    assert!(client.restart_after_expiry().is_err());
}

#[tokio::test]
async fn locally_expired_session_is_not_sent() {
    let now = chrono::Utc::now();
    let stale = Session::with_expiry("old", now - chrono::TimeDelta::minutes(30), now);
    let transport = ScriptedTransport::new(false)
        .session(Ok(stale))
        .session(fresh_session())
        .query(image_info());
    let calls = Arc::clone(&transport.calls);
    let dir = tempfile::tempdir().unwrap();
    let mut client = client(transport);

    client
        .run(&BoardSelection::new(BOARD), dir.path(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(calls.acquire.load(Ordering::SeqCst), 2);
    assert_eq!(calls.query.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_board_needs_manual_override() {
    let dir = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new(false).session(fresh_session());
    let calls = Arc::clone(&transport.calls);
    let mut rejecting = client(transport);
    let err = rejecting
        .run(
            &BoardSelection::new("Mac-0000000000000000"),
            dir.path(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Recovery(RecoveryError::UnknownBoard { ref board_id }) if board_id == "Mac-0000000000000000"
    ));
    assert_eq!(calls.query.load(Ordering::SeqCst), 0);

    let transport = ScriptedTransport::new(false)
        .session(fresh_session())
        .query(image_info());
    let mut accepting = client(transport);
    let mut selection = BoardSelection::new("Mac-0000000000000000");
    selection.manual_override = true;
    let artifacts = accepting
        .run(&selection, dir.path(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(artifacts.product.id, "Mac-0000000000000000");
    assert!(artifacts
        .image_path
        .starts_with(dir.path().join("Mac-0000000000000000/default/recovery")));
}

#[tokio::test]
async fn out_of_order_calls_are_rejected() {
    let transport = ScriptedTransport::new(false)
        .session(fresh_session())
        .query(image_info());
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let mut client = client(transport);

    let err = client.request_image(dir.path(), &cancel).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Recovery(RecoveryError::InvalidState { .. })
    ));
    assert_eq!(client.state(), RecoveryState::Init);

    assert!(client.resolve_product(&BoardSelection::new(BOARD)).is_err());

    client.acquire_session(&cancel).await.unwrap();
    client.resolve_product(&BoardSelection::new(BOARD)).unwrap();
    assert_eq!(
        client.session().and_then(Session::board_id),
        Some(BOARD)
    );
    client.request_image(dir.path(), &cancel).await.unwrap();
    assert_eq!(client.state(), RecoveryState::Complete);

    let err = client.acquire_session(&cancel).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Recovery(RecoveryError::InvalidState { ref state, .. }) if state == "complete"
    ));
}

#[tokio::test]
async fn unsigned_chunklist_is_refused_by_default() {
    let transport = ScriptedTransport::new(false)
        .session(fresh_session())
        .query(image_info());
    let calls = Arc::clone(&transport.calls);
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(BoardRegistry::from_json(DATASET).unwrap());
    let keys = vec![macfetch_signing::TrustedKey::apple_efi_rom().unwrap()];
    let mut client = RecoverySessionClient::new(transport, registry, keys);

    let err = client
        .run(&BoardSelection::new(BOARD), dir.path(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Signing(SigningError::MissingSignature)
    ));
    assert_eq!(calls.download.load(Ordering::SeqCst), 0);
    assert!(!dir.path().join("monterey").exists());
}

#[tokio::test]
async fn forged_signature_is_refused() {
    let transport = ScriptedTransport::new(true)
        .session(fresh_session())
        .query(image_info());
    let calls = Arc::clone(&transport.calls);
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(BoardRegistry::from_json(DATASET).unwrap());
    let keys = vec![macfetch_signing::TrustedKey::apple_efi_rom().unwrap()];
    let mut client = RecoverySessionClient::new(transport, registry, keys).allow_unsigned(true);

    let err = client
        .run(&BoardSelection::new(BOARD), dir.path(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Signing(SigningError::VerificationFailed { .. })
    ));
    assert_eq!(calls.download.load(Ordering::SeqCst), 0);
    assert!(!dir
        .path()
        .join("monterey/12/recovery/BaseSystem.chunklist")
        .exists());
}

#[tokio::test]
async fn unsigned_chunklist_accepted_without_any_keys() {
    let transport = ScriptedTransport::new(false)
        .session(fresh_session())
        .query(image_info());
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(BoardRegistry::from_json(DATASET).unwrap());
    let mut client = RecoverySessionClient::new(transport, registry, Vec::new()).allow_unsigned(true);

    let artifacts = client
        .run(&BoardSelection::new(BOARD), dir.path(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(artifacts.download.verified);
    assert_eq!(artifacts.key_id, None);
}

#[tokio::test]
async fn latest_and_default_images_are_kept_apart() {
    let dir = tempfile::tempdir().unwrap();
    let mut paths = Vec::new();
    for os_type in [OsType::Default, OsType::Latest] {
        let transport = ScriptedTransport::new(false)
            .session(fresh_session())
            .query(image_info());
        let mut selection = BoardSelection::new(BOARD);
        selection.os_type = os_type;
        let artifacts = client(transport)
            .run(&selection, dir.path(), &CancellationToken::new())
            .await
            .unwrap();
        paths.push((artifacts.image_path, artifacts.chunklist_path));
    }

    assert_eq!(paths[0].0, dir.path().join("monterey/12/recovery/BaseSystem.dmg"));
    assert_eq!(paths[1].0, dir.path().join("monterey/latest/recovery/BaseSystem.dmg"));
    assert_ne!(paths[0].1, paths[1].1);
    assert!(paths[0].0.exists());
    assert!(paths[1].0.exists());
}

#[tokio::test]
async fn chunklist_path_is_owned_until_the_image_lands() {
    let transport = ScriptedTransport::new(false)
        .session(fresh_session())
        .query(image_info());
    let calls = Arc::clone(&transport.calls);
    let claims = transport.claims.clone();
    let dir = tempfile::tempdir().unwrap();
    let chunklist_path = dir.path().join("monterey/12/recovery/BaseSystem.chunklist");
    let held = claims.claim(&chunklist_path).unwrap();
    let mut client = client(transport);

    let err = client
        .run(&BoardSelection::new(BOARD), dir.path(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Task(TaskError::DestinationBusy { .. })));
    assert_eq!(calls.download.load(Ordering::SeqCst), 0);
    assert!(!chunklist_path.exists());

    drop(held);
    assert!(!claims.is_claimed(&chunklist_path));
}
