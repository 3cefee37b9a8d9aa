//! Shared state for one tracker instance.
//!
//! Builder and sender jobs receive an `Arc<TrackerContext>` instead of
//! reaching for globals: configuration, the offline store, consent state,
//! the serial queue and the offline-drain flag all live here.

use crate::config::TrackerConfig;
use crate::connectivity::{AlwaysOnline, Connectivity};
use crate::core::privacy::Privacy;
use crate::delegate::{HitStatus, TrackerDelegate};
use crate::delivery::queue::TrackerQueue;
use crate::delivery::transport::{HttpTransport, Transport, TransportError};
use crate::offline::storage::{Storage, StorageError};
use crate::plugin::PluginRegistry;
use crate::technical::TechnicalContext;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// File names under the configured data path.
pub const STORAGE_FILE: &str = "offline.db";
pub const PRIVACY_FILE: &str = "privacy.json";
pub const USER_ID_FILE: &str = "idclient";

/// Errors raised while assembling a context.
#[derive(Debug)]
pub enum ContextError {
    Storage(StorageError),
    Transport(TransportError),
    Queue(String),
}

impl std::fmt::Display for ContextError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextError::Storage(e) => write!(f, "{e}"),
            ContextError::Transport(e) => write!(f, "{e}"),
            ContextError::Queue(e) => write!(f, "Queue error: {e}"),
        }
    }
}

impl std::error::Error for ContextError {}

/// Shared tracker state.
pub struct TrackerContext {
    config: RwLock<TrackerConfig>,
    storage: Arc<Storage>,
    privacy: Arc<Privacy>,
    technical: Arc<TechnicalContext>,
    plugins: PluginRegistry,
    connectivity: Arc<dyn Connectivity>,
    transport: Arc<dyn Transport>,
    delegate: RwLock<Option<Arc<dyn TrackerDelegate>>>,
    queue: TrackerQueue,
    offline_processing: AtomicBool,
    offline_in_flight: AtomicUsize,
}

impl TrackerContext {
    pub fn builder(config: TrackerConfig) -> TrackerContextBuilder {
        TrackerContextBuilder::new(config)
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> TrackerConfig {
        self.config.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_config(&self, key: &str, value: &str) {
        self.config
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .set(key, value);
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn privacy(&self) -> &Arc<Privacy> {
        &self.privacy
    }

    pub fn technical(&self) -> &Arc<TechnicalContext> {
        &self.technical
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn connectivity(&self) -> &Arc<dyn Connectivity> {
        &self.connectivity
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn queue(&self) -> &TrackerQueue {
        &self.queue
    }

    pub fn set_delegate(&self, delegate: Option<Arc<dyn TrackerDelegate>>) {
        *self.delegate.write().unwrap_or_else(|e| e.into_inner()) = delegate;
    }

    fn delegate(&self) -> Option<Arc<dyn TrackerDelegate>> {
        self.delegate.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn notify_build(&self, status: HitStatus, message: &str) {
        tracing::debug!(%status, hits = message, "Build ended");
        if let Some(delegate) = self.delegate() {
            delegate.build_did_end(status, message);
        }
    }

    pub(crate) fn notify_send(&self, status: HitStatus, message: &str) {
        match status {
            HitStatus::Success => tracing::info!(hit = message, "Hit sent"),
            HitStatus::Failed => tracing::info!(reason = message, "Hit not sent"),
        }
        if let Some(delegate) = self.delegate() {
            delegate.send_did_end(status, message);
        }
    }

    pub(crate) fn notify_save(&self, message: &str) {
        tracing::info!(hit = message, "Hit saved to offline storage");
        if let Some(delegate) = self.delegate() {
            delegate.save_did_end(message);
        }
    }

    pub(crate) fn warning(&self, message: &str) {
        tracing::warn!("{message}");
        if let Some(delegate) = self.delegate() {
            delegate.warning_did_occur(message);
        }
    }

    pub(crate) fn error(&self, message: &str) {
        tracing::error!("{message}");
        if let Some(delegate) = self.delegate() {
            delegate.error_did_occur(message);
        }
    }

    /// Claim the offline drain. `None` while another drain is running.
    pub(crate) fn begin_offline_drain(&self) -> Option<DrainGuard<'_>> {
        self.offline_processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| DrainGuard {
                flag: &self.offline_processing,
            })
    }

    pub fn is_draining_offline_hits(&self) -> bool {
        self.offline_processing.load(Ordering::SeqCst)
    }

    /// Offline-hit senders queued or running.
    pub fn offline_senders_in_flight(&self) -> usize {
        self.offline_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn offline_sender_queued(&self) {
        self.offline_in_flight.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn offline_sender_done(&self) {
        let _ = self
            .offline_in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }
}

impl std::fmt::Debug for TrackerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerContext")
            .field("config", &self.config())
            .field("queue", &self.queue)
            .field("plugins", &self.plugins)
            .finish_non_exhaustive()
    }
}

/// Releases the offline drain flag when dropped.
pub(crate) struct DrainGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Assembles a [`TrackerContext`], defaulting every unset collaborator from
/// the configuration's data path.
pub struct TrackerContextBuilder {
    config: TrackerConfig,
    storage: Option<Arc<Storage>>,
    privacy: Option<Arc<Privacy>>,
    technical: Option<Arc<TechnicalContext>>,
    connectivity: Option<Arc<dyn Connectivity>>,
    transport: Option<Arc<dyn Transport>>,
    delegate: Option<Arc<dyn TrackerDelegate>>,
}

impl TrackerContextBuilder {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            storage: None,
            privacy: None,
            technical: None,
            connectivity: None,
            transport: None,
            delegate: None,
        }
    }

    pub fn storage(mut self, storage: Arc<Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn privacy(mut self, privacy: Arc<Privacy>) -> Self {
        self.privacy = Some(privacy);
        self
    }

    pub fn technical(mut self, technical: Arc<TechnicalContext>) -> Self {
        self.technical = Some(technical);
        self
    }

    pub fn connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn delegate(mut self, delegate: Arc<dyn TrackerDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn build(self) -> Result<Arc<TrackerContext>, ContextError> {
        let data_path = self.config.data_path();

        let storage = match self.storage {
            Some(storage) => storage,
            None => Arc::new(Storage::open(&data_path.join(STORAGE_FILE)).map_err(ContextError::Storage)?),
        };
        let privacy = self
            .privacy
            .unwrap_or_else(|| Arc::new(Privacy::with_persistence(data_path.join(PRIVACY_FILE))));
        let technical = self.technical.unwrap_or_else(|| {
            Arc::new(TechnicalContext::with_persistence(data_path.join(USER_ID_FILE)))
        });
        let connectivity = self
            .connectivity
            .unwrap_or_else(|| Arc::new(AlwaysOnline) as Arc<dyn Connectivity>);
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new().map_err(ContextError::Transport)?),
        };
        let queue = TrackerQueue::new().map_err(|e| ContextError::Queue(e.to_string()))?;

        Ok(Arc::new(TrackerContext {
            config: RwLock::new(self.config),
            storage,
            privacy,
            technical,
            plugins: PluginRegistry::new(),
            connectivity,
            transport,
            delegate: RwLock::new(self.delegate),
            queue,
            offline_processing: AtomicBool::new(false),
            offline_in_flight: AtomicUsize::new(0),
        }))
    }
}
