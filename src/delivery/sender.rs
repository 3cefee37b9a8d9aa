//! Hit delivery.
//!
//! A [`Sender`] owns one hit. It either delivers it, persists it for later,
//! or drops it, depending on the storage policy, connectivity and whether
//! older hits are still waiting in offline storage.

use crate::config::StorageMode;
use crate::context::TrackerContext;
use crate::delegate::HitStatus;
use crate::delivery::transport::REQUEST_TIMEOUT;
use crate::offline::hit::Hit;
use crate::offline::storage::MAX_RETRY_COUNT;
use std::sync::Arc;

/// What happened to a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Delivered with HTTP 200.
    Sent,
    /// Persisted to (or left in) offline storage.
    Saved,
    /// Neither delivered nor stored.
    Dropped,
    /// Delivery attempted and failed.
    Failed,
}

pub struct Sender {
    ctx: Arc<TrackerContext>,
    hit: Hit,
    force_send_offline_hits: bool,
    mh_olt: Option<String>,
    cancelled: bool,
}

impl Sender {
    pub fn new(
        ctx: Arc<TrackerContext>,
        hit: Hit,
        force_send_offline_hits: bool,
        mh_olt: Option<String>,
    ) -> Self {
        Self {
            ctx,
            hit,
            force_send_offline_hits,
            mh_olt,
            cancelled: false,
        }
    }

    /// A cancelled sender persists its hit instead of sending it.
    pub fn cancelled(mut self, cancelled: bool) -> Self {
        self.cancelled = cancelled;
        self
    }

    pub fn hit(&self) -> &Hit {
        &self.hit
    }

    /// Run this sender on the tracker queue.
    pub fn enqueue(self, include_offline_hits: bool) {
        let ctx = self.ctx.clone();
        let offline = self.hit.is_offline;
        if offline {
            ctx.offline_sender_queued();
        }

        ctx.queue().enqueue(move |state| {
            let cancelled = self.cancelled || state.cancelled;
            let sender = self.cancelled(cancelled);
            sender.send(include_offline_hits);
            if offline {
                sender.ctx.offline_sender_done();
            }
        });
    }

    /// Deliver the hit, optionally replaying stored hits first.
    pub fn send(&self, include_offline_hits: bool) -> SendOutcome {
        if include_offline_hits {
            send_offline_hits(&self.ctx, false, false);
        }

        let storage_mode = self.ctx.config().storage_mode();
        let online = self.ctx.connectivity().is_online();

        if (storage_mode == StorageMode::Always && !self.force_send_offline_hits)
            || !online
            || self.has_backlog()
        {
            return self.save(storage_mode);
        }

        if self.cancelled {
            tracing::debug!(hit = %self.hit.url, "Sender cancelled, saving hit");
            return self.save(storage_mode);
        }

        match self.ctx.transport().get(&self.hit.url, REQUEST_TIMEOUT) {
            Ok(200) => {
                if self.hit.is_offline {
                    if let Err(e) = self.ctx.storage().delete(&self.hit.url) {
                        self.ctx
                            .warning(&format!("Sent offline hit could not be removed: {e}"));
                    }
                }
                self.ctx.notify_send(HitStatus::Success, &self.hit.url);
                SendOutcome::Sent
            }
            Ok(status) => self.on_failure(storage_mode, &format!("HTTP status {status}")),
            Err(e) => self.on_failure(storage_mode, &e.to_string()),
        }
    }

    /// A new hit must queue behind hits already stored.
    fn has_backlog(&self) -> bool {
        if self.hit.is_offline {
            return false;
        }
        match self.ctx.storage().count() {
            Ok(count) => count > 0,
            Err(e) => {
                self.ctx.warning(&format!("Offline storage unavailable: {e}"));
                false
            }
        }
    }

    fn save(&self, storage_mode: StorageMode) -> SendOutcome {
        if self.hit.is_offline {
            return SendOutcome::Saved;
        }
        if storage_mode == StorageMode::Never {
            self.ctx
                .warning("Hit could not be sent and offline storage is disabled, hit dropped");
            return SendOutcome::Dropped;
        }

        match self.ctx.storage().insert(&self.hit.url, self.mh_olt.as_deref()) {
            Ok(_) => {
                self.ctx.notify_save(&self.hit.url);
                SendOutcome::Saved
            }
            Err(e) => {
                self.ctx.warning(&format!("Hit could not be saved: {e}"));
                SendOutcome::Dropped
            }
        }
    }

    fn on_failure(&self, storage_mode: StorageMode, reason: &str) -> SendOutcome {
        if storage_mode == StorageMode::Never {
            self.ctx.warning("Hit delivery failed and offline storage is disabled, hit dropped");
        } else if self.hit.is_offline {
            self.record_retry();
        } else {
            self.save(storage_mode);
        }

        self.ctx.notify_send(HitStatus::Failed, reason);
        SendOutcome::Failed
    }

    fn record_retry(&self) {
        let storage = self.ctx.storage();
        let url = &self.hit.url;

        let result = storage.get_retry_count(url).and_then(|current| {
            let retry = current.unwrap_or(self.hit.retry_count) + 1;
            if retry >= MAX_RETRY_COUNT {
                self.ctx.warning(&format!(
                    "Offline hit dropped after {MAX_RETRY_COUNT} failed attempts: {url}"
                ));
                storage.delete(url)
            } else {
                storage.set_retry_count(url, retry)
            }
        });
        if let Err(e) = result {
            self.ctx.warning(&format!("Retry count could not be updated: {e}"));
        }
    }
}

/// Replay stored hits, oldest first.
///
/// Does nothing when storage mode is `always` (unless `force`), when offline,
/// while another replay runs, or while queued offline senders are pending.
/// A synchronous replay stops at the first hit that is not delivered.
/// Returns the number of hits delivered (sync) or queued (async).
pub fn send_offline_hits(ctx: &Arc<TrackerContext>, force: bool, run_async: bool) -> usize {
    if ctx.config().storage_mode() == StorageMode::Always && !force {
        return 0;
    }
    if !ctx.connectivity().is_online() {
        return 0;
    }
    let Some(_guard) = ctx.begin_offline_drain() else {
        tracing::debug!("Offline hits already being sent");
        return 0;
    };
    if ctx.offline_senders_in_flight() > 0 {
        return 0;
    }

    let hits = match ctx.storage().get() {
        Ok(hits) => hits,
        Err(e) => {
            ctx.warning(&format!("Offline hits could not be read: {e}"));
            return 0;
        }
    };

    if run_async {
        let queued = hits.len();
        for hit in hits {
            Sender::new(ctx.clone(), hit, force, None).enqueue(false);
        }
        return queued;
    }

    let mut delivered = 0;
    for hit in hits {
        if Sender::new(ctx.clone(), hit, force, None).send(false) != SendOutcome::Sent {
            break;
        }
        delivered += 1;
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{keys, TrackerConfig};
    use crate::connectivity::ManualConnectivity;
    use crate::core::privacy::Privacy;
    use crate::delivery::transport::{Transport, TransportError};
    use crate::offline::storage::Storage;
    use crate::technical::TechnicalContext;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        status: Mutex<u16>,
        urls: Mutex<Vec<String>>,
    }

    impl Transport for Recorder {
        fn get(&self, url: &str, _timeout: Duration) -> Result<u16, TransportError> {
            self.urls.lock().unwrap().push(url.to_string());
            Ok(*self.status.lock().unwrap())
        }
    }

    fn context(
        storage: &str,
        status: u16,
    ) -> (Arc<TrackerContext>, Arc<Recorder>, Arc<ManualConnectivity>) {
        let transport = Arc::new(Recorder::default());
        *transport.status.lock().unwrap() = status;
        let connectivity = Arc::new(ManualConnectivity::new(true));
        let ctx = TrackerContext::builder(TrackerConfig::default().with(keys::STORAGE, storage))
            .storage(Arc::new(Storage::open_in_memory().unwrap()))
            .privacy(Arc::new(Privacy::new()))
            .technical(Arc::new(TechnicalContext::new()))
            .transport(transport.clone())
            .connectivity(connectivity.clone())
            .build()
            .unwrap();
        (ctx, transport, connectivity)
    }

    const URL: &str = "http://logp.xiti.com/hit.xiti?s=1&ts=100&cn=wifi&p=home";

    #[test]
    fn test_sent_when_online() {
        let (ctx, transport, _) = context("required", 200);
        let outcome = Sender::new(ctx.clone(), Hit::new(URL), false, None).send(false);
        assert_eq!(outcome, SendOutcome::Sent);
        assert_eq!(*transport.urls.lock().unwrap(), vec![URL.to_string()]);
        assert_eq!(ctx.storage().count().unwrap(), 0);
    }

    #[test]
    fn test_saved_when_offline() {
        let (ctx, transport, connectivity) = context("required", 200);
        connectivity.set_online(false);
        let outcome = Sender::new(ctx.clone(), Hit::new(URL), false, None).send(false);
        assert_eq!(outcome, SendOutcome::Saved);
        assert!(transport.urls.lock().unwrap().is_empty());

        let stored = ctx.storage().get().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].param("cn"), Some("offline"));
        assert!(stored[0].param("olt").is_some());
    }

    #[test]
    fn test_storage_always_saves() {
        let (ctx, transport, _) = context("always", 200);
        let outcome = Sender::new(ctx.clone(), Hit::new(URL), false, None).send(false);
        assert_eq!(outcome, SendOutcome::Saved);
        assert!(transport.urls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_storage_never_drops() {
        let (ctx, _, connectivity) = context("never", 200);
        connectivity.set_online(false);
        let outcome = Sender::new(ctx.clone(), Hit::new(URL), false, None).send(false);
        assert_eq!(outcome, SendOutcome::Dropped);
        assert_eq!(ctx.storage().count().unwrap(), 0);
    }

    #[test]
    fn test_failed_hit_is_saved_with_mh_olt() {
        let (ctx, _, _) = context("required", 500);
        let outcome = Sender::new(ctx.clone(), Hit::new(URL), false, Some("12.000".into())).send(false);
        assert_eq!(outcome, SendOutcome::Failed);
        let stored = ctx.storage().get().unwrap();
        assert_eq!(stored[0].param("olt"), Some("12.000"));
    }

    #[test]
    fn test_backlog_forces_new_hit_to_storage() {
        let (ctx, transport, _) = context("required", 200);
        ctx.storage().insert("http://logp.xiti.com/hit.xiti?s=1&ts=1", None).unwrap();
        let outcome = Sender::new(ctx.clone(), Hit::new(URL), false, None).send(false);
        assert_eq!(outcome, SendOutcome::Saved);
        assert!(transport.urls.lock().unwrap().is_empty());
        assert_eq!(ctx.storage().count().unwrap(), 2);
    }

    #[test]
    fn test_cancelled_sender_saves() {
        let (ctx, transport, _) = context("required", 200);
        let outcome = Sender::new(ctx.clone(), Hit::new(URL), false, None)
            .cancelled(true)
            .send(false);
        assert_eq!(outcome, SendOutcome::Saved);
        assert!(transport.urls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_offline_hit_dropped_after_retry_ceiling() {
        let (ctx, transport, _) = context("required", 503);
        ctx.storage().insert(URL, None).unwrap();

        for attempt in 1..MAX_RETRY_COUNT {
            assert_eq!(send_offline_hits(&ctx, false, false), 0);
            let stored = ctx.storage().get().unwrap();
            assert_eq!(stored.len(), 1);
            assert_eq!(stored[0].retry_count, attempt);
        }
        send_offline_hits(&ctx, false, false);
        assert_eq!(ctx.storage().count().unwrap(), 0);
        assert_eq!(transport.urls.lock().unwrap().len(), MAX_RETRY_COUNT as usize);
    }

    #[test]
    fn test_sync_drain_stops_at_first_failure() {
        let (ctx, transport, _) = context("required", 200);
        for ts in 1..=3 {
            ctx.storage()
                .insert(&format!("http://logp.xiti.com/hit.xiti?s=1&ts={ts}"), None)
                .unwrap();
            std::thread::sleep(Duration::from_millis(2));
        }

        *transport.status.lock().unwrap() = 500;
        assert_eq!(send_offline_hits(&ctx, false, false), 0);
        assert_eq!(transport.urls.lock().unwrap().len(), 1);

        *transport.status.lock().unwrap() = 200;
        assert_eq!(send_offline_hits(&ctx, false, false), 3);
        let sent = transport.urls.lock().unwrap();
        assert!(sent[1].contains("ts=1"));
        assert!(sent[2].contains("ts=2"));
        assert!(sent[3].contains("ts=3"));
        assert_eq!(ctx.storage().count().unwrap(), 0);
    }

    #[test]
    fn test_drain_skipped_when_storage_always_unless_forced() {
        let (ctx, transport, _) = context("always", 200);
        ctx.storage().insert(URL, None).unwrap();

        assert_eq!(send_offline_hits(&ctx, false, false), 0);
        assert!(transport.urls.lock().unwrap().is_empty());

        assert_eq!(send_offline_hits(&ctx, true, false), 1);
        assert_eq!(ctx.storage().count().unwrap(), 0);
    }

    #[test]
    fn test_async_drain_runs_on_queue() {
        let (ctx, transport, _) = context("required", 200);
        ctx.storage().insert(URL, None).unwrap();

        assert_eq!(send_offline_hits(&ctx, false, true), 1);
        ctx.queue().wait_until_idle();
        assert_eq!(transport.urls.lock().unwrap().len(), 1);
        assert_eq!(ctx.offline_senders_in_flight(), 0);
        assert_eq!(ctx.storage().count().unwrap(), 0);
    }
}
