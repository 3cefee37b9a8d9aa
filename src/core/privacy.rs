//! Consent-driven parameter filtering.
//!
//! Each [`PrivacyMode`] maps to a whitelist of parameter keys. Hits built while
//! a restrictive mode is active only carry whitelisted keys, plus the marker
//! parameters (`vc`, `vm`, possibly a forced `idclient`) identifying the mode.
//!
//! Whitelist entries of the form `stc.<path>`, `events.<path>` or
//! `context.<path>` filter inside the JSON payload of those parameters:
//! the payload is flattened to dotted keys and only matching leaves are kept.

use crate::core::encoding::{percent_decode, percent_encode};
use crate::core::param::DEFAULT_SEPARATOR;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::RwLock;

/// Default lifetime of a consent choice, in days.
pub const DEFAULT_MODE_DURATION_DAYS: i64 = 397;

/// Parameters whose JSON payload can be filtered by sub-key.
pub const COMPOUND_KEYS: [&str; 3] = ["stc", "events", "context"];

/// Visitor consent mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PrivacyMode {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "optin")]
    OptIn,
    #[serde(rename = "optout")]
    OptOut,
    #[serde(rename = "no-consent")]
    NoConsent,
    #[serde(rename = "exempt")]
    Exempt,
}

impl PrivacyMode {
    pub const ALL: [PrivacyMode; 5] = [
        PrivacyMode::None,
        PrivacyMode::OptIn,
        PrivacyMode::OptOut,
        PrivacyMode::NoConsent,
        PrivacyMode::Exempt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PrivacyMode::None => "none",
            PrivacyMode::OptIn => "optin",
            PrivacyMode::OptOut => "optout",
            PrivacyMode::NoConsent => "no-consent",
            PrivacyMode::Exempt => "exempt",
        }
    }

    /// Marker parameters forced into every hit built under this mode.
    pub fn markers(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            PrivacyMode::None => &[],
            PrivacyMode::OptIn => &[("vc", "1"), ("vm", "optin")],
            PrivacyMode::OptOut => &[("vc", "0"), ("vm", "optout"), ("idclient", "opt-out")],
            PrivacyMode::NoConsent => &[("vc", "0"), ("vm", "no-consent"), ("idclient", "Consent-NO")],
            PrivacyMode::Exempt => &[("vc", "0"), ("vm", "exempt")],
        }
    }

    fn default_include_keys(&self) -> Vec<String> {
        let keys: &[&str] = match self {
            PrivacyMode::None | PrivacyMode::OptIn => &["*"],
            PrivacyMode::OptOut | PrivacyMode::NoConsent => {
                &["idclient", "ts", "olt", "cn", "click", "type"]
            }
            PrivacyMode::Exempt => &[
                "idclient", "ts", "olt", "cn", "click", "type", "p", "vtag", "ptag", "dg", "sy",
                "s2", "pclick", "s2click", "ref", "apvr", "mfmd", "hl", "r", "stc.app*",
                "stc.device*", "events.name", "context.device*",
            ],
        };
        keys.iter().map(|k| k.to_string()).collect()
    }
}

impl std::fmt::Display for PrivacyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PrivacyMode {
    type Err = PrivacyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(PrivacyMode::None),
            "optin" | "opt-in" => Ok(PrivacyMode::OptIn),
            "optout" | "opt-out" => Ok(PrivacyMode::OptOut),
            "no-consent" | "noconsent" => Ok(PrivacyMode::NoConsent),
            "exempt" => Ok(PrivacyMode::Exempt),
            other => Err(PrivacyError::UnknownMode(other.to_string())),
        }
    }
}

/// A parameter after formatting: `&key=value` plus the separator used
/// between its value chunks (already encoded when the param is encoded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedParam {
    pub key: String,
    pub formatted: String,
    pub separator: String,
}

impl FormattedParam {
    pub fn new(key: &str, value: &str, separator: &str) -> Self {
        Self {
            key: key.to_string(),
            formatted: format!("&{key}={value}"),
            separator: separator.to_string(),
        }
    }

    /// The value part, without the `&key=` prefix.
    pub fn value(&self) -> &str {
        let prefix_len = self.key.len() + 2;
        self.formatted.get(prefix_len..).unwrap_or("")
    }
}

/// Privacy errors.
#[derive(Debug)]
pub enum PrivacyError {
    IoError(String),
    ParseError(String),
    UnknownMode(String),
}

impl std::fmt::Display for PrivacyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrivacyError::IoError(e) => write!(f, "IO error: {e}"),
            PrivacyError::ParseError(e) => write!(f, "Parse error: {e}"),
            PrivacyError::UnknownMode(m) => write!(f, "Unknown privacy mode: {m}"),
        }
    }
}

impl std::error::Error for PrivacyError {}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct ModeState {
    mode: PrivacyMode,
    expires_at: Option<DateTime<Utc>>,
}

/// Current consent mode and the per-mode whitelists.
#[derive(Debug)]
pub struct Privacy {
    state: RwLock<ModeState>,
    include_buffer: RwLock<HashMap<PrivacyMode, Vec<String>>>,
    persist_path: Option<PathBuf>,
}

impl Privacy {
    pub fn new() -> Self {
        let include_buffer = PrivacyMode::ALL
            .iter()
            .map(|mode| (*mode, mode.default_include_keys()))
            .collect();
        Self {
            state: RwLock::new(ModeState::default()),
            include_buffer: RwLock::new(include_buffer),
            persist_path: None,
        }
    }

    /// Create a privacy store backed by a JSON file.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut privacy = Self::new();
        privacy.persist_path = Some(path);

        if let Err(e) = privacy.load() {
            tracing::warn!("Could not load privacy mode: {e}");
        }

        privacy
    }

    /// Current mode. An expired mode reverts to [`PrivacyMode::None`].
    pub fn current_mode(&self) -> PrivacyMode {
        let state = *self.state.read().unwrap_or_else(|e| e.into_inner());
        match state.expires_at {
            Some(expires_at) if Utc::now() >= expires_at => {
                tracing::info!(mode = %state.mode, "Privacy mode expired, reverting to none");
                self.store(ModeState::default());
                PrivacyMode::None
            }
            _ => state.mode,
        }
    }

    /// Expiration of the current mode, if any.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().unwrap_or_else(|e| e.into_inner()).expires_at
    }

    /// Set the mode for the default duration.
    pub fn set_mode(&self, mode: PrivacyMode) {
        self.set_mode_for(mode, DEFAULT_MODE_DURATION_DAYS);
    }

    /// Set the mode for `days` days. `None` never expires.
    pub fn set_mode_for(&self, mode: PrivacyMode, days: i64) {
        let expires_at = match mode {
            PrivacyMode::None => None,
            _ => Some(Utc::now() + Duration::days(days)),
        };
        self.store(ModeState { mode, expires_at });
    }

    /// Add keys to a mode's whitelist.
    pub fn extend_include_buffer(&self, mode: PrivacyMode, keys: &[&str]) {
        let mut buffer = self.include_buffer.write().unwrap_or_else(|e| e.into_inner());
        let entry = buffer.entry(mode).or_default();
        for key in keys {
            if !entry.iter().any(|k| k == key) {
                entry.push(key.to_string());
            }
        }
    }

    pub fn include_keys(&self, mode: PrivacyMode) -> Vec<String> {
        self.include_buffer
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&mode)
            .cloned()
            .unwrap_or_default()
    }

    /// Filter formatted parameters for the current mode and add its markers.
    pub fn apply(&self, params: Vec<FormattedParam>) -> Vec<FormattedParam> {
        let mode = self.current_mode();
        let patterns = self.include_keys(mode);
        let mut result = filter_params(params, &patterns);

        for (key, value) in mode.markers() {
            let marker = FormattedParam::new(key, value, DEFAULT_SEPARATOR);
            match result.iter_mut().find(|p| p.key == *key) {
                Some(existing) => *existing = marker,
                None => result.push(marker),
            }
        }
        result
    }

    /// Save the mode to disk.
    pub fn save(&self) -> Result<(), PrivacyError> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| PrivacyError::IoError(e.to_string()))?;
            }
            let state = *self.state.read().unwrap_or_else(|e| e.into_inner());
            let json = serde_json::to_string_pretty(&state)
                .map_err(|e| PrivacyError::ParseError(e.to_string()))?;
            std::fs::write(path, json).map_err(|e| PrivacyError::IoError(e.to_string()))?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), PrivacyError> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content =
                    std::fs::read_to_string(path).map_err(|e| PrivacyError::IoError(e.to_string()))?;
                let state: ModeState = serde_json::from_str(&content)
                    .map_err(|e| PrivacyError::ParseError(e.to_string()))?;
                *self.state.write().unwrap_or_else(|e| e.into_inner()) = state;
            }
        }
        Ok(())
    }

    fn store(&self, state: ModeState) {
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = state;
        if let Err(e) = self.save() {
            tracing::warn!("Could not persist privacy mode: {e}");
        }
    }
}

impl Default for Privacy {
    fn default() -> Self {
        Self::new()
    }
}

fn filter_params(params: Vec<FormattedParam>, patterns: &[String]) -> Vec<FormattedParam> {
    if patterns.iter().any(|p| p == "*") {
        return params;
    }

    let mut plain: HashSet<&str> = HashSet::new();
    let mut sub_keys: HashMap<&str, Vec<&str>> = HashMap::new();
    for pattern in patterns {
        match pattern.split_once('.') {
            Some((field, rest)) if COMPOUND_KEYS.contains(&field) => {
                sub_keys.entry(field).or_default().push(rest);
            }
            _ => {
                plain.insert(pattern.as_str());
            }
        }
    }

    params
        .into_iter()
        .filter_map(|param| {
            if plain.contains(param.key.as_str()) {
                Some(param)
            } else if let Some(allowed) = sub_keys.get(param.key.as_str()) {
                filter_compound(param, allowed)
            } else {
                None
            }
        })
        .collect()
}

fn filter_compound(param: FormattedParam, allowed: &[&str]) -> Option<FormattedParam> {
    let raw = param.value();
    let (json, encoded) = match serde_json::from_str::<Value>(raw) {
        Ok(v) => (v, false),
        Err(_) => (serde_json::from_str::<Value>(&percent_decode(raw)).ok()?, true),
    };

    let filtered = filter_json(&json, allowed)?.to_string();
    let value = if encoded {
        percent_encode(&filtered)
    } else {
        filtered
    };
    Some(FormattedParam::new(&param.key, &value, &param.separator))
}

fn filter_json(value: &Value, allowed: &[&str]) -> Option<Value> {
    match value {
        Value::Object(_) => {
            let mut flat = BTreeMap::new();
            flatten("", value, &mut flat);
            let kept: BTreeMap<String, Value> = flat
                .into_iter()
                .filter(|(key, _)| allowed.iter().any(|pattern| key_matches(key, pattern)))
                .collect();
            if kept.is_empty() {
                None
            } else {
                Some(unflatten(kept))
            }
        }
        Value::Array(items) => {
            let kept: Vec<Value> = items.iter().filter_map(|item| filter_json(item, allowed)).collect();
            if kept.is_empty() {
                None
            } else {
                Some(Value::Array(kept))
            }
        }
        _ => None,
    }
}

/// Exact match, or prefix match up to the first `*`.
fn key_matches(key: &str, pattern: &str) -> bool {
    match pattern.find('*') {
        Some(idx) => key.starts_with(&pattern[..idx]),
        None => key == pattern,
    }
}

fn flatten(prefix: &str, value: &Value, out: &mut BTreeMap<String, Value>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (k, v) in map {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                flatten(&key, v, out);
            }
        }
        _ => {
            out.insert(prefix.to_string(), value.clone());
        }
    }
}

fn unflatten(flat: BTreeMap<String, Value>) -> Value {
    let mut root = Map::new();
    for (key, value) in flat {
        let parts: Vec<&str> = key.split('.').collect();
        insert_path(&mut root, &parts, value);
    }
    Value::Object(root)
}

fn insert_path(map: &mut Map<String, Value>, parts: &[&str], value: Value) {
    match parts {
        [] => {}
        [last] => {
            map.insert(last.to_string(), value);
        }
        [head, rest @ ..] => {
            let entry = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(child) = entry {
                insert_path(child, rest, value);
            }
        }
    }
}
