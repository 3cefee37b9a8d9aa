//! Device-level context: user identifier and do-not-track preference.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// Resolves and persists the identifier sent as `idclient`.
#[derive(Debug, Default)]
pub struct TechnicalContext {
    persist_path: Option<PathBuf>,
    custom_user_id: RwLock<Option<String>>,
    generated_user_id: RwLock<Option<String>>,
    do_not_track: AtomicBool,
}

impl TechnicalContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the generated identifier in `path` across runs.
    pub fn with_persistence(path: PathBuf) -> Self {
        Self {
            persist_path: Some(path),
            ..Self::default()
        }
    }

    /// Resolve the user id for an identifier strategy.
    ///
    /// `device` derives the id from the hostname; anything else uses a
    /// generated UUID stored on first use. A custom id set with
    /// [`TechnicalContext::set_user_id`] wins over both.
    pub fn user_id(&self, identifier: &str) -> String {
        if let Some(custom) = self
            .custom_user_id
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
        {
            return custom;
        }

        match identifier {
            "device" => device_id(),
            _ => self.generated_id(),
        }
    }

    /// Override the resolved user id (`None` restores the default).
    pub fn set_user_id(&self, user_id: Option<String>) {
        *self.custom_user_id.write().unwrap_or_else(|e| e.into_inner()) = user_id;
    }

    pub fn set_do_not_track(&self, enabled: bool) {
        self.do_not_track.store(enabled, Ordering::SeqCst);
    }

    pub fn do_not_track(&self) -> bool {
        self.do_not_track.load(Ordering::SeqCst)
    }

    fn generated_id(&self) -> String {
        if let Some(id) = self
            .generated_user_id
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
        {
            return id;
        }

        let mut slot = self
            .generated_user_id
            .write()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(id) = slot.clone() {
            return id;
        }

        let id = self.load_persisted().unwrap_or_else(|| {
            let id = uuid::Uuid::new_v4().to_string();
            self.persist(&id);
            id
        });
        *slot = Some(id.clone());
        id
    }

    fn load_persisted(&self) -> Option<String> {
        let path = self.persist_path.as_ref()?;
        let content = std::fs::read_to_string(path).ok()?;
        let id = content.trim();
        (!id.is_empty()).then(|| id.to_string())
    }

    fn persist(&self, id: &str) {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    tracing::warn!("Could not create user id directory: {e}");
                }
            }
            if let Err(e) = std::fs::write(path, id) {
                tracing::warn!("Could not persist user id: {e}");
            }
        }
    }
}

fn device_id() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_id_is_stable() {
        let context = TechnicalContext::new();
        let first = context.user_id("uuid");
        assert_eq!(first.len(), 36);
        assert_eq!(context.user_id("uuid"), first);
    }

    #[test]
    fn test_generated_id_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idclient");

        let id = TechnicalContext::with_persistence(path.clone()).user_id("uuid");
        let reloaded = TechnicalContext::with_persistence(path).user_id("uuid");
        assert_eq!(id, reloaded);
    }

    #[test]
    fn test_unwritable_directory_keeps_id_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file").unwrap();
        let path = blocker.join("state").join("idclient");

        let context = TechnicalContext::with_persistence(path.clone());
        let id = context.user_id("uuid");
        assert_eq!(id.len(), 36);
        assert_eq!(context.user_id("uuid"), id);
        assert!(!path.exists());
    }

    #[test]
    fn test_custom_id_overrides() {
        let context = TechnicalContext::new();
        context.set_user_id(Some("user-42".to_string()));
        assert_eq!(context.user_id("uuid"), "user-42");
        assert_eq!(context.user_id("device"), "user-42");

        context.set_user_id(None);
        assert_ne!(context.user_id("uuid"), "user-42");
    }

    #[test]
    fn test_do_not_track_flag() {
        let context = TechnicalContext::new();
        assert!(!context.do_not_track());
        context.set_do_not_track(true);
        assert!(context.do_not_track());
    }
}
