//! Orchestration store: session, reachability, artifact catalog and
//! in-flight action tracking, mutated only through the action methods below.
//!
//! Every action folds its own failures into state and surfaces exactly one
//! notification before returning, so callers never have to clean up after a
//! failed action. State locks are never held across a backend call.

use std::{
    collections::BTreeSet,
    sync::{Arc, Weak},
    time::Duration,
};

use chrono::Utc;
use shared::{
    domain::{AccountProfile, ActionKind, ProcessedItem, ServerReachability, SessionStatus},
    protocol::{AuthStatusResponse, ProcessRequest},
};
use tokio::{
    sync::{broadcast, watch, Mutex},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};

use crate::{
    catalog::RemoteCatalog,
    config::{ClientSettings, DEFAULT_WATERMARK_TEXT},
    error::{ActionError, TransportError},
    persistence::{FileSettingsStore, PersistenceBridge, SettingsStore},
    transport::{EndpointHandle, HttpTransport, Transport},
    validation::{Credentials, Endpoint, ImageUpload},
};

const NOTIFICATION_CAPACITY: usize = 64;

pub const MSG_CONNECTED: &str = "Connected";
pub const MSG_UNHEALTHY: &str = "Server Unhealthy";
pub const MSG_CONNECTION_FAILED: &str = "Connection Failed";
pub const MSG_STATUS_CHECK_FAILED: &str = "Status check failed";
pub const MSG_CATALOG_LOAD_FAILED: &str = "Failed to load processed images";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Error,
}

/// A user-visible message produced by an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

/// Everything the presentation layer renders from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSnapshot {
    pub session: SessionStatus,
    pub reachability: ServerReachability,
    pub items: Vec<ProcessedItem>,
    pub in_flight: BTreeSet<ActionKind>,
    pub base_url: String,
}

impl StoreSnapshot {
    pub fn busy(&self) -> bool {
        !self.in_flight.is_empty()
    }

    pub fn item(&self, id: &str) -> Option<&ProcessedItem> {
        self.items.iter().find(|item| item.id == id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    pub caption: Option<String>,
    /// Defaults to [`DEFAULT_WATERMARK_TEXT`].
    pub watermark_text: Option<String>,
    pub watermark_opacity: Option<u8>,
}

/// Orders responses of one refresh kind. A response is applied only if it
/// was issued after the last applied one.
#[derive(Debug, Default)]
struct Sequencer {
    issued: u64,
    applied: u64,
}

impl Sequencer {
    fn issue(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    fn accept(&mut self, seq: u64) -> bool {
        if seq > self.applied {
            self.applied = seq;
            true
        } else {
            false
        }
    }
}

struct StoreState {
    session: SessionStatus,
    reachability: ServerReachability,
    items: Vec<ProcessedItem>,
    in_flight: BTreeSet<ActionKind>,
    reachability_seq: Sequencer,
    session_seq: Sequencer,
}

struct Poller {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct AppStore {
    catalog: RemoteCatalog,
    endpoint: EndpointHandle,
    persistence: PersistenceBridge,
    state: Mutex<StoreState>,
    snapshots: watch::Sender<StoreSnapshot>,
    notifications: broadcast::Sender<Notification>,
    poller: Mutex<Option<Poller>>,
}

impl AppStore {
    /// Builds the store context once at process start. A persisted base
    /// address, if present and valid, replaces the endpoint's current value;
    /// no connectivity probe is issued.
    pub fn new(
        transport: Arc<dyn Transport>,
        endpoint: EndpointHandle,
        persistence: PersistenceBridge,
    ) -> Arc<Self> {
        if let Some(saved) = persistence.restore_endpoint() {
            match Endpoint::parse(&saved) {
                Ok(parsed) => endpoint.set(parsed.as_str()),
                Err(err) => warn!(error = %err, "ignoring persisted api base url"),
            }
        }

        let state = StoreState {
            session: SessionStatus::default(),
            reachability: ServerReachability::default(),
            items: Vec::new(),
            in_flight: BTreeSet::new(),
            reachability_seq: Sequencer::default(),
            session_seq: Sequencer::default(),
        };
        let (snapshots, _) = watch::channel(snapshot_of(&state, endpoint.get()));
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        Arc::new(Self {
            catalog: RemoteCatalog::new(transport),
            endpoint,
            persistence,
            state: Mutex::new(state),
            snapshots,
            notifications,
            poller: Mutex::new(None),
        })
    }

    /// Wires the HTTP transport and file-backed persistence from settings.
    pub fn from_settings(settings: &ClientSettings) -> anyhow::Result<Arc<Self>> {
        let endpoint = EndpointHandle::new(settings.api_base_url.clone());
        let transport = HttpTransport::new(endpoint.clone())?;
        let settings_path = match &settings.settings_path {
            Some(path) => path.clone(),
            None => FileSettingsStore::default_path()?,
        };
        let store: Arc<dyn SettingsStore> = Arc::new(FileSettingsStore::new(settings_path));
        Ok(Self::new(
            Arc::new(transport),
            endpoint,
            PersistenceBridge::new(store),
        ))
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receives a fresh snapshot after every state change.
    pub fn watch(&self) -> watch::Receiver<StoreSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    pub fn busy(&self) -> bool {
        self.snapshots.borrow().busy()
    }

    pub fn base_url(&self) -> String {
        self.endpoint.get()
    }

    /// Startup sequence: reachability first, then session.
    pub async fn initialize(&self) {
        self.refresh_reachability().await;
        self.refresh_session().await;
    }

    /// Manual refresh of both status slices, issued concurrently.
    pub async fn refresh_all(&self) {
        futures::join!(self.refresh_reachability(), self.refresh_session());
    }

    pub async fn refresh_reachability(&self) {
        let seq = self.state.lock().await.reachability_seq.issue();

        let reachability = match self.catalog.health().await {
            Ok(health) if health.is_healthy() => ServerReachability {
                reachable: true,
                message: MSG_CONNECTED.to_string(),
                server_timestamp: health.timestamp,
                last_checked_at: Some(Utc::now()),
            },
            Ok(health) => {
                warn!(status = ?health.status, "backend reported unhealthy status");
                unhealthy()
            }
            // The server answered, just not with a readable health payload.
            Err(TransportError::Malformed(reason)) => {
                warn!(reason = %reason, "backend returned an unreadable health payload");
                unhealthy()
            }
            Err(err) => {
                debug!(error = %err, "health check failed");
                ServerReachability {
                    reachable: false,
                    message: MSG_CONNECTION_FAILED.to_string(),
                    server_timestamp: None,
                    last_checked_at: Some(Utc::now()),
                }
            }
        };

        self.mutate(|state| {
            if state.reachability_seq.accept(seq) {
                state.reachability = reachability;
            } else {
                debug!(seq, "dropping stale health response");
            }
        })
        .await;
    }

    pub async fn refresh_session(&self) {
        let seq = self.state.lock().await.session_seq.issue();

        let session = match self.catalog.auth_status().await {
            Ok(status) => session_from_status(status),
            Err(err) => {
                debug!(error = %err, "session status check failed");
                SessionStatus::disconnected(Some(MSG_STATUS_CHECK_FAILED.to_string()))
            }
        };

        self.mutate(|state| {
            if state.session_seq.accept(seq) {
                state.session = session;
            } else {
                debug!(seq, "dropping stale session response");
            }
        })
        .await;
    }

    /// Logs in and, on success, reloads the session status. The credentials
    /// are consumed and wiped when this returns.
    pub async fn authenticate(&self, credentials: Credentials) -> Result<(), ActionError> {
        self.begin(ActionKind::Login).await?;
        info!(handle = credentials.handle(), "login requested");

        let login = self
            .catalog
            .login(credentials.handle(), credentials.secret())
            .await;
        drop(credentials);

        let outcome = match login {
            Ok(response) if response.confirmed() => {
                self.notify_success("Successfully logged in to Instagram!");
                self.refresh_session().await;
                Ok(())
            }
            Ok(response) => {
                let message = response
                    .error
                    .unwrap_or_else(|| "Login failed".to_string());
                Err(self.fail(ActionError::Failed(message), "Login failed"))
            }
            Err(err) => Err(self.fail(err.into(), "Login failed")),
        };

        self.finish(ActionKind::Login).await;
        outcome
    }

    /// Replaces the whole catalog with the server's list. On failure the
    /// current (possibly stale) list is kept.
    pub async fn refresh_catalog(&self) -> Result<(), ActionError> {
        match self.catalog.list_processed().await {
            Ok(response) => {
                if let Some(items) = response.processed_images {
                    debug!(count = items.len(), "catalog refreshed");
                    self.mutate(|state| state.items = items).await;
                }
                Ok(())
            }
            Err(err) => {
                self.notify_error(MSG_CATALOG_LOAD_FAILED);
                warn!(error = %err, "catalog refresh failed");
                Err(err.into())
            }
        }
    }

    /// Uploads then processes one image. `process` is never issued unless the
    /// upload returned a file name; an upload that processing later rejects is
    /// left on the server.
    pub async fn submit_new(
        &self,
        upload: ImageUpload,
        options: SubmitOptions,
    ) -> Result<(), ActionError> {
        self.begin(ActionKind::Submit).await?;

        let outcome = match self.upload_and_process(upload, options).await {
            Ok(file_id) => {
                info!(file_id = %file_id, "image processed");
                self.notify_success("Image processed successfully!");
                let _ = self.refresh_catalog().await;
                Ok(())
            }
            Err(err) => Err(self.fail(err, "Upload failed")),
        };

        self.finish(ActionKind::Submit).await;
        outcome
    }

    async fn upload_and_process(
        &self,
        upload: ImageUpload,
        options: SubmitOptions,
    ) -> Result<String, ActionError> {
        let (bytes, file_name, mime_type) = upload.into_parts();
        debug!(file_name = %file_name, size_bytes = bytes.len(), "uploading image");

        let uploaded = self.catalog.upload(bytes, &file_name, &mime_type).await?;
        let file_id = uploaded
            .filename
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| ActionError::Failed("Upload failed".to_string()))?;

        let request = ProcessRequest {
            filename: file_id.clone(),
            custom_caption: options.caption.filter(|c| !c.trim().is_empty()),
            watermark_text: Some(
                options
                    .watermark_text
                    .unwrap_or_else(|| DEFAULT_WATERMARK_TEXT.to_string()),
            ),
            watermark_opacity: options.watermark_opacity,
        };
        let processed = self.catalog.process(&request).await?;
        if !processed.confirmed() {
            return Err(ActionError::Failed(
                processed
                    .error
                    .unwrap_or_else(|| "Processing failed".to_string()),
            ));
        }
        Ok(file_id)
    }

    /// Publishes one artifact. The item is marked published only once the
    /// server confirms; the catalog is then reloaded from the server.
    pub async fn publish(&self, id: &str, caption: Option<&str>) -> Result<(), ActionError> {
        self.begin(ActionKind::Publish).await?;

        let outcome = match self.catalog.post(id, caption).await {
            Ok(response) if response.confirmed() => {
                info!(file_id = id, "artifact published");
                self.mutate(|state| {
                    if let Some(item) = state.items.iter_mut().find(|item| item.id == id) {
                        item.published = true;
                    }
                })
                .await;
                self.notify_success("Posted to Instagram successfully!");
                let _ = self.refresh_catalog().await;
                Ok(())
            }
            Ok(response) => {
                let message = response
                    .error
                    .unwrap_or_else(|| "Posting failed".to_string());
                Err(self.fail(ActionError::Failed(message), "Posting failed"))
            }
            Err(err) => Err(self.fail(err.into(), "Posting failed")),
        };

        self.finish(ActionKind::Publish).await;
        outcome
    }

    /// Asks the backend to publish the next unpublished artifact of its choosing.
    pub async fn publish_next(&self) -> Result<(), ActionError> {
        self.begin(ActionKind::Publish).await?;

        let outcome = match self.catalog.post_next().await {
            Ok(response) if response.confirmed() => {
                self.notify_success(
                    response
                        .message
                        .as_deref()
                        .unwrap_or("Posted to Instagram successfully!"),
                );
                let _ = self.refresh_catalog().await;
                Ok(())
            }
            Ok(response) => {
                let message = response
                    .error
                    .or(response.message)
                    .unwrap_or_else(|| "No new images to post".to_string());
                Err(self.fail(ActionError::Failed(message), "Posting failed"))
            }
            Err(err) => Err(self.fail(err.into(), "Posting failed")),
        };

        self.finish(ActionKind::Publish).await;
        outcome
    }

    pub async fn remove(&self, id: &str) -> Result<(), ActionError> {
        self.begin(ActionKind::Delete).await?;

        let outcome = match self.catalog.delete_processed(id).await {
            Ok(response) if !response.refused() => {
                info!(file_id = id, "artifact deleted");
                self.mutate(|state| state.items.retain(|item| item.id != id))
                    .await;
                self.notify_success("Image deleted");
                Ok(())
            }
            Ok(response) => {
                let message = response
                    .error
                    .unwrap_or_else(|| "Delete failed".to_string());
                Err(self.fail(ActionError::Failed(message), "Delete failed"))
            }
            Err(err) => Err(self.fail(err.into(), "Delete failed")),
        };

        self.finish(ActionKind::Delete).await;
        outcome
    }

    /// Downloads an artifact's bytes for preview. Read-only and not tracked as
    /// an in-flight action.
    pub async fn fetch_preview(&self, id: &str) -> Result<Vec<u8>, TransportError> {
        self.catalog.download(id).await.inspect_err(|err| {
            debug!(file_id = id, error = %err, "preview download failed");
        })
    }

    pub async fn preview_url(&self, id: &str) -> Option<String> {
        self.catalog.download_url(id).await.ok()
    }

    /// Points every later request at `endpoint` and persists it. Does not
    /// probe the new address; call [`AppStore::refresh_reachability`] for that.
    pub async fn set_endpoint(&self, endpoint: Endpoint) {
        info!(base_url = %endpoint, "api base url changed");
        self.endpoint.set(endpoint.as_str());
        self.persistence.persist_endpoint(endpoint.as_str());
        self.mutate(|_| ()).await;
    }

    /// Starts the background poller, replacing any running one. It ticks
    /// immediately and then every `interval`.
    pub async fn start_polling(self: &Arc<Self>, interval: Duration, include_session: bool) {
        self.stop_polling().await;

        let (stop, mut stop_rx) = watch::channel(false);
        let store: Weak<Self> = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        let Some(store) = store.upgrade() else {
                            break;
                        };
                        store.refresh_reachability().await;
                        if include_session {
                            store.refresh_session().await;
                        }
                    }
                }
            }
            debug!("status poller stopped");
        });

        info!(
            interval_secs = interval.as_secs(),
            include_session, "status poller started"
        );
        *self.poller.lock().await = Some(Poller { stop, task });
    }

    pub async fn stop_polling(&self) {
        let Some(poller) = self.poller.lock().await.take() else {
            return;
        };
        let _ = poller.stop.send(true);
        poller.task.abort();
        let _ = poller.task.await;
    }

    pub async fn is_polling(&self) -> bool {
        self.poller.lock().await.is_some()
    }

    pub async fn shutdown(&self) {
        self.stop_polling().await;
        info!("store shut down");
    }

    async fn begin(&self, kind: ActionKind) -> Result<(), ActionError> {
        let accepted = self.mutate(|state| state.in_flight.insert(kind)).await;
        if accepted {
            debug!(action = %kind, "action started");
            Ok(())
        } else {
            let err = ActionError::Busy(kind);
            self.notify_error(&err.to_string());
            Err(err)
        }
    }

    async fn finish(&self, kind: ActionKind) {
        self.mutate(|state| {
            state.in_flight.remove(&kind);
        })
        .await;
        debug!(action = %kind, "action finished");
    }

    /// Surfaces one notification for a failed action and hands the error back.
    fn fail(&self, err: ActionError, fallback: &str) -> ActionError {
        let message = match &err {
            ActionError::Transport(transport) => transport.user_message(fallback),
            other => other.to_string(),
        };
        warn!(error = %err, "action failed");
        self.notify_error(&message);
        err
    }

    async fn mutate<R>(&self, f: impl FnOnce(&mut StoreState) -> R) -> R {
        let mut state = self.state.lock().await;
        let result = f(&mut state);
        self.snapshots
            .send_replace(snapshot_of(&state, self.endpoint.get()));
        result
    }

    fn notify_success(&self, message: &str) {
        info!(message, "notification");
        self.notify(NotificationLevel::Success, message);
    }

    fn notify_error(&self, message: &str) {
        warn!(message, "notification");
        self.notify(NotificationLevel::Error, message);
    }

    fn notify(&self, level: NotificationLevel, message: &str) {
        let _ = self.notifications.send(Notification {
            level,
            message: message.to_string(),
        });
    }
}

fn unhealthy() -> ServerReachability {
    ServerReachability {
        reachable: false,
        message: MSG_UNHEALTHY.to_string(),
        server_timestamp: None,
        last_checked_at: Some(Utc::now()),
    }
}

fn snapshot_of(state: &StoreState, base_url: String) -> StoreSnapshot {
    StoreSnapshot {
        session: state.session.clone(),
        reachability: state.reachability.clone(),
        items: state.items.clone(),
        in_flight: state.in_flight.clone(),
        base_url,
    }
}

fn session_from_status(status: AuthStatusResponse) -> SessionStatus {
    if !status.logged_in {
        return SessionStatus::disconnected(status.message);
    }
    let account = status.account.unwrap_or_default();
    SessionStatus::connected(
        AccountProfile {
            handle: account.username,
            display_name: account.full_name,
            follower_count: account.follower_count,
            following_count: account.following_count,
            item_count: account.media_count,
        },
        status.message,
    )
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
