//! Hit value object.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A built hit URL on its way to the collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hit {
    /// Full hit URL
    pub url: String,
    /// Whether the hit was read back from offline storage
    pub is_offline: bool,
    /// When the hit was built (or stored, for offline hits)
    pub creation_date: DateTime<Utc>,
    /// Failed resend attempts so far
    pub retry_count: u32,
}

impl Hit {
    /// Create a freshly built hit.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            is_offline: false,
            creation_date: Utc::now(),
            retry_count: 0,
        }
    }

    /// Look up a query parameter value by key.
    pub fn param(&self, key: &str) -> Option<&str> {
        let query = self.url.split_once('?').map(|(_, q)| q)?;
        query.split('&').find_map(|component| {
            let (k, v) = component.split_once('=')?;
            (k == key).then_some(v)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_lookup() {
        let hit = Hit::new("https://logs.xiti.com/hit.xiti?s=123&p=home&cn=wifi");
        assert_eq!(hit.param("s"), Some("123"));
        assert_eq!(hit.param("p"), Some("home"));
        assert_eq!(hit.param("cn"), Some("wifi"));
        assert_eq!(hit.param("x"), None);
        assert!(!hit.is_offline);
    }
}
