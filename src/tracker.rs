//! Public tracking surface.
//!
//! A [`Tracker`] owns the parameter buffer and a [`TrackerContext`]. Calls
//! are fire-and-forget: `dispatch` snapshots the buffer and queues a build,
//! and every outcome is reported through the [`TrackerDelegate`].

use crate::config::TrackerConfig;
use crate::context::{ContextError, TrackerContext};
use crate::core::buffer::Buffer;
use crate::core::builder::Builder;
use crate::core::param::{Param, ParamOption, ParamValue, ValueSource};
use crate::core::privacy::{Privacy, PrivacyMode};
use crate::delegate::TrackerDelegate;
use crate::delivery::sender;
use crate::offline::hit::Hit;
use crate::offline::storage::StorageError;
use chrono::{Local, Timelike, Utc};
use std::sync::{Arc, Mutex, MutexGuard};

/// Value of the `ptag` parameter.
pub const PLATFORM_TAG: &str = "Rust";

pub struct Tracker {
    ctx: Arc<TrackerContext>,
    buffer: Mutex<Buffer>,
}

impl Tracker {
    /// Create a tracker whose state lives under the configured data path.
    pub fn new(config: TrackerConfig) -> Result<Self, ContextError> {
        Ok(Self::with_context(TrackerContext::builder(config).build()?))
    }

    pub fn with_context(ctx: Arc<TrackerContext>) -> Self {
        let tracker = Self {
            ctx,
            buffer: Mutex::new(Buffer::new()),
        };
        tracker.set_default_params();
        tracker.purge_stale_hits();
        tracker
    }

    pub fn context(&self) -> &Arc<TrackerContext> {
        &self.ctx
    }

    fn buffer(&self) -> MutexGuard<'_, Buffer> {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_default_params(&self) {
        let persistent = ParamOption::default().persistent();
        let ctx = Arc::downgrade(&self.ctx);
        let id_ctx = ctx.clone();

        self.set_param("vtag", crate::VERSION, persistent.clone())
            .set_param("ptag", PLATFORM_TAG, persistent.clone())
            .set_param(
                "ts",
                ValueSource::computed(|| ParamValue::Int(Utc::now().timestamp_millis())),
                persistent.clone(),
            )
            .set_param(
                "idclient",
                ValueSource::computed(move || match id_ctx.upgrade() {
                    Some(ctx) => {
                        let config = ctx.config();
                        ParamValue::from(ctx.technical().user_id(config.identifier()))
                    }
                    None => ParamValue::from(""),
                }),
                persistent.clone(),
            )
            .set_param(
                "cn",
                ValueSource::computed(move || {
                    let online = ctx
                        .upgrade()
                        .map(|ctx| ctx.connectivity().is_online())
                        .unwrap_or(false);
                    ParamValue::from(if online { "online" } else { "offline" })
                }),
                persistent.clone(),
            )
            .set_param(
                "hl",
                ValueSource::computed(|| {
                    let now = Local::now();
                    ParamValue::from(format!("{}x{}x{}", now.hour(), now.minute(), now.second()))
                }),
                persistent,
            );
    }

    fn purge_stale_hits(&self) {
        let days = self.ctx.config().storage_duration_days();
        let cutoff = Utc::now() - chrono::Duration::days(days);
        match self.ctx.storage().delete_older_than(cutoff) {
            Ok(0) => {}
            Ok(purged) => tracing::info!(purged, days, "Purged stale offline hits"),
            Err(e) => self.ctx.warning(&format!("Stale offline hits could not be purged: {e}")),
        }
    }

    pub fn set_param(&self, key: &str, value: impl Into<ValueSource>, options: ParamOption) -> &Self {
        self.buffer().set_param(key, value, options);
        self
    }

    pub fn unset_param(&self, key: &str) -> &Self {
        self.buffer().unset_param(key);
        self
    }

    pub fn param(&self, key: &str) -> Option<Param> {
        self.buffer().get(key).cloned()
    }

    pub fn set_config(&self, key: &str, value: &str) {
        self.ctx.set_config(key, value);
    }

    pub fn set_delegate(&self, delegate: Arc<dyn TrackerDelegate>) {
        self.ctx.set_delegate(Some(delegate));
    }

    pub fn set_user_id(&self, user_id: Option<String>) {
        self.ctx.technical().set_user_id(user_id);
    }

    pub fn set_do_not_track(&self, enabled: bool) {
        self.ctx.technical().set_do_not_track(enabled);
    }

    pub fn privacy(&self) -> &Privacy {
        self.ctx.privacy()
    }

    pub fn set_privacy_mode(&self, mode: PrivacyMode) {
        self.ctx.privacy().set_mode(mode);
    }

    /// Build hits from the current buffer without sending them or clearing
    /// volatile parameters.
    pub fn build_hits(&self) -> Vec<String> {
        let (persistent, volatile) = {
            let buffer = self.buffer();
            (buffer.persistent().to_vec(), buffer.volatile().to_vec())
        };
        Builder::new(self.ctx.clone(), persistent, volatile).build()
    }

    /// Queue a build of the current buffer. Volatile parameters are cleared.
    pub fn dispatch(&self) {
        let (persistent, volatile) = self.buffer().take_for_build();
        let ctx = self.ctx.clone();
        self.ctx
            .queue()
            .enqueue(move |state| Builder::new(ctx, persistent, volatile).main(state));
    }

    /// Replay stored hits. See [`sender::send_offline_hits`].
    pub fn send_offline_hits(&self, force: bool, run_async: bool) -> usize {
        sender::send_offline_hits(&self.ctx, force, run_async)
    }

    pub fn offline_hits(&self) -> Result<Vec<Hit>, StorageError> {
        self.ctx.storage().get()
    }

    /// Cancel queued work; pending hits are stored instead of sent.
    pub fn cancel_pending(&self) {
        self.ctx.queue().cancel_all();
    }

    /// Block until every queued build and send has finished.
    pub fn wait_until_idle(&self) {
        self.ctx.queue().wait_until_idle();
    }
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("context", &self.ctx)
            .field("buffer", &*self.buffer())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::keys;
    use crate::connectivity::ManualConnectivity;
    use crate::delivery::transport::{Transport, TransportError};
    use crate::offline::storage::Storage;
    use crate::technical::TechnicalContext;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        urls: Mutex<Vec<String>>,
    }

    impl Transport for Recorder {
        fn get(&self, url: &str, _timeout: Duration) -> Result<u16, TransportError> {
            self.urls.lock().unwrap().push(url.to_string());
            Ok(200)
        }
    }

    fn tracker_with(storage: Arc<Storage>, config: TrackerConfig) -> (Tracker, Arc<Recorder>) {
        let transport = Arc::new(Recorder::default());
        let ctx = TrackerContext::builder(config)
            .storage(storage)
            .privacy(Arc::new(Privacy::new()))
            .technical(Arc::new(TechnicalContext::new()))
            .connectivity(Arc::new(ManualConnectivity::new(true)))
            .transport(transport.clone())
            .build()
            .unwrap();
        (Tracker::with_context(ctx), transport)
    }

    fn config() -> TrackerConfig {
        TrackerConfig::default().with(keys::SITE, "552987")
    }

    #[test]
    fn test_default_params() {
        let (tracker, _) = tracker_with(Arc::new(Storage::open_in_memory().unwrap()), config());
        for key in ["vtag", "ptag", "ts", "idclient", "cn", "hl"] {
            let param = tracker.param(key).unwrap();
            assert!(param.options.persistent, "{key} should be persistent");
        }
        assert_eq!(
            tracker.param("ptag").unwrap().evaluate(),
            vec![ParamValue::from(PLATFORM_TAG)]
        );
        assert_eq!(
            tracker.param("cn").unwrap().evaluate(),
            vec![ParamValue::from("online")]
        );
    }

    #[test]
    fn test_custom_user_id_in_hit() {
        let (tracker, _) = tracker_with(Arc::new(Storage::open_in_memory().unwrap()), config());
        tracker.set_user_id(Some("visitor-7".into()));
        let hits = tracker.build_hits();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].contains("&idclient=visitor-7"));
    }

    #[test]
    fn test_dispatch_sends_and_clears_volatile() {
        let (tracker, transport) = tracker_with(Arc::new(Storage::open_in_memory().unwrap()), config());
        tracker
            .set_param("p", "home", ParamOption::default())
            .set_param("s2", 4, ParamOption::default());
        tracker.dispatch();
        tracker.wait_until_idle();

        assert!(tracker.param("p").is_none());
        assert!(tracker.param("vtag").is_some());

        let urls = transport.urls.lock().unwrap();
        assert_eq!(urls.len(), 1);
        assert!(urls[0].starts_with("http://logp.xiti.com/hit.xiti?s=552987&vtag="));
        assert!(urls[0].contains("&p=home&s2=4"));
    }

    #[test]
    fn test_cancelled_dispatch_stores_hit() {
        let (tracker, transport) = tracker_with(Arc::new(Storage::open_in_memory().unwrap()), config());
        let (gate_tx, gate_rx) = std::sync::mpsc::channel::<()>();
        tracker.context().queue().enqueue(move |_| {
            let _ = gate_rx.recv();
        });

        tracker.set_param("p", "home", ParamOption::default());
        tracker.dispatch();
        tracker.cancel_pending();
        gate_tx.send(()).unwrap();
        tracker.wait_until_idle();

        assert!(transport.urls.lock().unwrap().is_empty());
        assert_eq!(tracker.offline_hits().unwrap().len(), 1);
    }

    #[test]
    fn test_stale_hits_purged_on_construction() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        storage.insert("http://a.b/c?s=1&ts=1", None).unwrap();

        let (_kept, _) = tracker_with(storage.clone(), config());
        assert_eq!(storage.count().unwrap(), 1);

        std::thread::sleep(Duration::from_millis(5));
        let (_purged, _) = tracker_with(storage.clone(), config().with(keys::STORAGE_DURATION, "0"));
        assert_eq!(storage.count().unwrap(), 0);
    }
}
