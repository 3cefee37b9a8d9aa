//! Hit assembly.
//!
//! The builder turns a snapshot of the parameter buffer into one or more
//! complete hit URLs:
//!
//! 1. Resolve the URL prefix from configuration (`scheme://log.domain/path?s=site`).
//! 2. Merge persistent and volatile params, run build-time plugins, order them.
//! 3. Evaluate and format each param, then apply the consent filter.
//! 4. Pack params into fragments no longer than the hit size limit, slicing
//!    oversized values of slice-ready params across fragments.
//! 5. Tag fragments of a multi-hit with a shared `mh` id.

use crate::config::{keys, TrackerConfig};
use crate::context::TrackerContext;
use crate::core::encoding::{percent_encode, sha256_hex, truncate_query};
use crate::core::param::{Param, ParamOption, ParamValue, RelativePosition, ValueSource};
use crate::core::privacy::FormattedParam;
use crate::delegate::HitStatus;
use crate::delivery::queue::JobState;
use crate::delivery::sender::Sender;
use crate::offline::hit::Hit;
use crate::offline::storage::olt_now;
use crate::plugin::TV_TRACKING_PLUGIN;
use chrono::Local;
use rand::Rng;
use serde_json::Value;
use std::sync::Arc;

/// Maximum length of a hit URL.
pub const HIT_MAX_LENGTH: usize = 1600;
/// Room kept for the `mh` parameter.
pub const MHID_MAX_LENGTH: usize = 30;
/// Room kept for the `olt` parameter added by offline storage.
pub const OLT_MAX_LENGTH: usize = 20;
/// Room kept for the `idclient` repeated on multi-hit fragments.
pub const IDCLIENT_MAX_LENGTH: usize = 40;
/// Room kept for separators.
pub const SEPARATOR_MAX_LENGTH: usize = 5;
/// Maximum number of fragments in one multi-hit.
pub const MAX_HIT_FRAGMENTS: usize = 999;
/// Marker appended when a hit had to be cut short.
pub const MHERR: &str = "&mherr=1";

/// Params whose value may be split across fragments.
pub const SLICE_READY_PARAMS: [&str; 6] = ["ati", "atc", "pdtl", "stc", "events", "context"];

const REFERRER_KEY: &str = "ref";
const USER_ID_KEY: &str = "idclient";
const CONTEXT_KEY: &str = "stc";

/// Something worth reporting that happened while packing fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildIssue {
    Warning(String),
    Error(String),
}

/// Resolve the hit URL prefix.
///
/// Requires the log subdomain (`logSSL` when `secure=true`), `domain`,
/// `pixelPath` and `site` to be non-empty.
pub fn build_configuration(config: &TrackerConfig) -> Result<String, String> {
    let (scheme, log_key) = if config.is_secure() {
        ("https", keys::LOG_SSL)
    } else {
        ("http", keys::LOG)
    };

    let parts = [
        config.get(log_key).unwrap_or_default(),
        config.get(keys::DOMAIN).unwrap_or_default(),
        config.get(keys::PIXEL_PATH).unwrap_or_default(),
        config.get(keys::SITE).unwrap_or_default(),
    ];
    let [log, domain, pixel_path, site] = parts;
    let prefix = format!("{scheme}://{log}.{domain}{pixel_path}?s={site}");

    let resolved = parts.iter().filter(|p| !p.is_empty()).count();
    if resolved != parts.len() {
        return Err(format!(
            "There is something wrong with configuration: {prefix}. Expected {} configuration keys, found {resolved}",
            parts.len()
        ));
    }
    Ok(prefix)
}

/// Builds hits from a buffer snapshot.
pub struct Builder {
    ctx: Arc<TrackerContext>,
    persistent: Vec<Param>,
    volatile: Vec<Param>,
}

impl Builder {
    pub fn new(ctx: Arc<TrackerContext>, persistent: Vec<Param>, volatile: Vec<Param>) -> Self {
        Self {
            ctx,
            persistent,
            volatile,
        }
    }

    /// Queue entry point: build, then hand every fragment to a sender.
    pub fn main(self, state: JobState) {
        let hits = self.build();
        let mh_olt = (hits.len() > 1).then(olt_now);

        for (index, url) in hits.into_iter().enumerate() {
            Sender::new(self.ctx.clone(), Hit::new(url), false, mh_olt.clone())
                .cancelled(state.cancelled)
                .enqueue(index == 0);
        }
    }

    /// Build the hit URLs. Empty when the configuration is incomplete.
    pub fn build(&self) -> Vec<String> {
        let config = self.ctx.config();
        let prefix = match build_configuration(&config) {
            Ok(prefix) => prefix,
            Err(message) => {
                self.ctx.error(&message);
                self.ctx.notify_build(HitStatus::Failed, &message);
                return Vec::new();
            }
        };

        let params = self.prepare_query();
        let (hits, issues) = assemble_hits(&prefix, &params);
        for issue in issues {
            match issue {
                BuildIssue::Warning(message) => self.ctx.warning(&message),
                BuildIssue::Error(message) => self.ctx.error(&message),
            }
        }

        self.ctx.notify_build(HitStatus::Success, &hits.join("\n"));
        hits
    }

    /// Merge, resolve, order, format and filter the parameters.
    pub fn prepare_query(&self) -> Vec<FormattedParam> {
        let config = self.ctx.config();
        let mut params = merge_params(&self.persistent, &self.volatile);
        self.resolve_plugins(&mut params, &config);

        let formatted = order_params(params)
            .iter()
            .map(|param| self.format_param(param, &config))
            .collect();
        self.ctx.privacy().apply(formatted)
    }

    fn resolve_plugins(&self, params: &mut Vec<Param>, config: &TrackerConfig) {
        let Some(pos) = params.iter().position(|p| p.key == TV_TRACKING_PLUGIN) else {
            return;
        };
        params.remove(pos);

        let Some(response) = self.ctx.plugins().run(TV_TRACKING_PLUGIN, config) else {
            self.ctx
                .warning(&format!("No plugin registered for parameter {TV_TRACKING_PLUGIN}"));
            return;
        };
        if response.is_empty() {
            return;
        }

        let value = match serde_json::from_str::<Value>(&response) {
            Ok(json) => ValueSource::Literal(ParamValue::Json(json)),
            Err(_) => ValueSource::Literal(ParamValue::Str(response)),
        };
        match params.iter_mut().find(|p| p.key == CONTEXT_KEY) {
            Some(stc) => stc.values.push(value),
            None => params.push(Param::new(
                CONTEXT_KEY,
                value,
                ParamOption::default().encode(),
            )),
        }
    }

    fn format_param(&self, param: &Param, config: &TrackerConfig) -> FormattedParam {
        let separator = param.options.separator.as_str();
        let values = param.evaluate();

        let mut value = if values.len() > 1 && values.iter().all(ParamValue::is_json) {
            merge_json(values).to_string()
        } else {
            values
                .iter()
                .map(|v| v.render(separator))
                .collect::<Vec<_>>()
                .join(separator)
        };

        match param.key.as_str() {
            USER_ID_KEY if self.ctx.technical().do_not_track() => value = "opt-out".to_string(),
            USER_ID_KEY if config.hash_user_id() => value = sha256_hex(&value),
            REFERRER_KEY => value.retain(|c| !matches!(c, '&' | '<' | '>')),
            _ => {}
        }

        if param.options.encode {
            FormattedParam::new(&param.key, &percent_encode(&value), &percent_encode(separator))
        } else {
            FormattedParam::new(&param.key, &value, separator)
        }
    }
}

/// Persistent params in order, with volatile params replacing same-key
/// entries in place or appended after them.
fn merge_params(persistent: &[Param], volatile: &[Param]) -> Vec<Param> {
    let mut merged = persistent.to_vec();
    for param in volatile {
        match merged.iter_mut().find(|p| p.key == param.key) {
            Some(slot) => *slot = param.clone(),
            None => merged.push(param.clone()),
        }
    }
    merged
}

/// One `first` param leads, one `last` param trails, `ref` always ends the hit.
fn order_params(params: Vec<Param>) -> Vec<Param> {
    let mut first = None;
    let mut last = None;
    let mut referrer = None;
    let mut middle = Vec::with_capacity(params.len());

    for param in params {
        if param.key == REFERRER_KEY {
            referrer = Some(param);
            continue;
        }
        match param.options.relative_position {
            RelativePosition::First if first.is_none() => first = Some(param),
            RelativePosition::Last if last.is_none() => last = Some(param),
            _ => middle.push(param),
        }
    }

    first
        .into_iter()
        .chain(middle)
        .chain(last)
        .chain(referrer)
        .collect()
}

fn merge_json(values: Vec<ParamValue>) -> Value {
    values
        .into_iter()
        .filter_map(|v| match v {
            ParamValue::Json(json) => Some(json),
            _ => None,
        })
        .reduce(|mut acc, next| {
            deep_merge(&mut acc, next);
            acc
        })
        .unwrap_or(Value::Null)
}

fn deep_merge(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => {
            for (key, value) in source {
                match target.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(target), Value::Array(source)) => target.extend(source),
        (target, source) => *target = source,
    }
}

/// Size budget for the param part of one fragment.
///
/// Fragments after the first repeat `&idclient=<id>`, so the reservation
/// grows past `IDCLIENT_MAX_LENGTH` for longer ids such as SHA-256 hashes.
pub fn reference_max_size(prefix_len: usize, user_id_len: usize) -> usize {
    let user_id_reserve = IDCLIENT_MAX_LENGTH.max(USER_ID_KEY.len() + 2 + user_id_len);
    HIT_MAX_LENGTH
        .saturating_sub(MHID_MAX_LENGTH)
        .saturating_sub(prefix_len)
        .saturating_sub(OLT_MAX_LENGTH)
        .saturating_sub(user_id_reserve)
        .saturating_sub(SEPARATOR_MAX_LENGTH)
}

/// Pack formatted params into fragments, then prefix each one.
pub fn assemble_hits(prefix: &str, params: &[FormattedParam]) -> (Vec<String>, Vec<BuildIssue>) {
    let user_id = params
        .iter()
        .find(|p| p.key == USER_ID_KEY)
        .map(|p| p.value().to_string())
        .unwrap_or_default();
    let max_size = reference_max_size(prefix.len(), user_id.len());
    let (fragments, mut issues) = slice_params(params, max_size);

    if fragments.len() == 1 {
        let hit = format!("{prefix}{}", fragments[0]);
        return (vec![hit], issues);
    }

    let suffix = mhid_suffix(fragments.len());
    let user_id_param = format!("&{USER_ID_KEY}=");

    let mut hits = Vec::with_capacity(fragments.len());
    for (index, fragment) in fragments.iter().enumerate() {
        if index >= MAX_HIT_FRAGMENTS {
            if index == MAX_HIT_FRAGMENTS {
                issues.push(BuildIssue::Warning(format!(
                    "Too many hits in multi-hit ({}), fragments beyond {MAX_HIT_FRAGMENTS} replaced by an error hit",
                    fragments.len()
                )));
            }
            hits.push(format!("{prefix}{MHERR}"));
            continue;
        }

        let mh = format!("&mh={}{suffix}", index + 1);
        if index == 0 || fragment.contains(&user_id_param) {
            hits.push(format!("{prefix}{mh}{fragment}"));
        } else {
            hits.push(format!("{prefix}{mh}{user_id_param}{user_id}{fragment}"));
        }
    }
    (hits, issues)
}

/// `-{count}-{HHmmss}{random}` shared by every fragment of a multi-hit.
fn mhid_suffix(count: usize) -> String {
    let random: u32 = rand::thread_rng().gen_range(0..10_000_000);
    format!("-{count}-{}{random}", Local::now().format("%H%M%S"))
}

/// Split params into fragments no longer than `max_size`.
fn slice_params(params: &[FormattedParam], max_size: usize) -> (Vec<String>, Vec<BuildIssue>) {
    let mut fragments: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut issues = Vec::new();

    'params: for param in params {
        let formatted = &param.formatted;

        if formatted.len() <= max_size {
            if current.len() + formatted.len() > max_size {
                fragments.push(std::mem::take(&mut current));
            }
            current.push_str(formatted);
            continue;
        }

        if !SLICE_READY_PARAMS.contains(&param.key.as_str()) || param.separator.is_empty() {
            issues.push(BuildIssue::Error(format!(
                "Too long parameter: {} ({} characters), hit truncated",
                param.key,
                formatted.len()
            )));
            current.push_str(MHERR);
            break;
        }

        let key_prefix = format!("&{}=", param.key);
        let mut carrying = false;
        for chunk in param.value().split(param.separator.as_str()) {
            let addition = if carrying {
                format!("{}{chunk}", param.separator)
            } else {
                format!("{key_prefix}{chunk}")
            };
            if current.len() + addition.len() <= max_size {
                current.push_str(&addition);
                carrying = true;
                continue;
            }

            let fresh = format!("{key_prefix}{chunk}");
            let at_capacity = fragments.len() + 1 >= MAX_HIT_FRAGMENTS;
            if at_capacity || fresh.len() > max_size {
                if !at_capacity && !current.is_empty() {
                    fragments.push(std::mem::take(&mut current));
                }
                let pending = if current.is_empty() { fresh } else { addition };
                let room = max_size.saturating_sub(current.len());
                current.push_str(&truncate_query(&pending, room));
                current.push_str(MHERR);
                issues.push(BuildIssue::Error(format!(
                    "Parameter {} could not be sliced into {MAX_HIT_FRAGMENTS} hits, value truncated",
                    param.key
                )));
                break 'params;
            }

            fragments.push(std::mem::take(&mut current));
            current = fresh;
            carrying = true;
        }
    }

    fragments.push(current);
    (fragments, issues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::privacy::Privacy;
    use crate::delivery::transport::{Transport, TransportError};
    use crate::offline::storage::Storage;
    use crate::plugin::Plugin;
    use crate::technical::TechnicalContext;
    use serde_json::json;
    use std::time::Duration;

    const PREFIX: &str = "https://logs.xiti.com/hit.xiti?s=552987";

    struct NoNetwork;

    impl Transport for NoNetwork {
        fn get(&self, _url: &str, _timeout: Duration) -> Result<u16, TransportError> {
            Err(TransportError::Network("disabled".into()))
        }
    }

    fn config() -> TrackerConfig {
        TrackerConfig::default()
            .with(keys::SECURE, "true")
            .with(keys::SITE, "552987")
    }

    fn context(config: TrackerConfig) -> Arc<TrackerContext> {
        TrackerContext::builder(config)
            .storage(Arc::new(Storage::open_in_memory().unwrap()))
            .privacy(Arc::new(Privacy::new()))
            .technical(Arc::new(TechnicalContext::new()))
            .transport(Arc::new(NoNetwork))
            .build()
            .unwrap()
    }

    fn param(key: &str, value: impl Into<ValueSource>, options: ParamOption) -> Param {
        Param::new(key, value, options)
    }

    fn formatted(key: &str, value: &str) -> FormattedParam {
        FormattedParam::new(key, value, ",")
    }

    #[test]
    fn test_build_configuration() {
        assert_eq!(build_configuration(&config()).unwrap(), PREFIX);

        let plain = config().with(keys::SECURE, "false");
        assert_eq!(
            build_configuration(&plain).unwrap(),
            "http://logp.xiti.com/hit.xiti?s=552987"
        );
    }

    #[test]
    fn test_build_configuration_requires_all_four_keys() {
        let required = [keys::LOG_SSL, keys::DOMAIN, keys::PIXEL_PATH, keys::SITE];
        for mask in 0u8..16 {
            let mut config = config();
            for (bit, key) in required.iter().enumerate() {
                if mask & (1 << bit) == 0 {
                    config.set(*key, "");
                }
            }
            let result = build_configuration(&config);
            if mask == 0b1111 {
                assert!(result.is_ok());
            } else {
                assert!(result.is_err(), "mask {mask:04b} should fail");
            }
        }
    }

    #[test]
    fn test_build_fails_without_site() {
        let ctx = context(config().with(keys::SITE, ""));
        let builder = Builder::new(ctx, vec![], vec![param("p", "home", ParamOption::default())]);
        assert!(builder.build().is_empty());
    }

    #[test]
    fn test_single_hit() {
        let ctx = context(config());
        let builder = Builder::new(
            ctx,
            vec![param("vtag", "1.0", ParamOption::default().persistent())],
            vec![param("p", "home page", ParamOption::default().encode())],
        );
        assert_eq!(builder.build(), vec![format!("{PREFIX}&vtag=1.0&p=home%20page")]);
    }

    #[test]
    fn test_volatile_overrides_persistent() {
        let merged = merge_params(
            &[param("p", "a", ParamOption::default().persistent()), param("x", "1", ParamOption::default())],
            &[param("p", "b", ParamOption::default()), param("y", "2", ParamOption::default())],
        );
        let keys: Vec<_> = merged.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["p", "x", "y"]);
        assert_eq!(merged[0].evaluate(), vec![ParamValue::from("b")]);
    }

    #[test]
    fn test_ordering_first_last_and_referrer() {
        let ordered = order_params(vec![
            param("ref", "http://x", ParamOption::default().first()),
            param("a", "1", ParamOption::default()),
            param("z", "9", ParamOption::default().last()),
            param("ts", "0", ParamOption::default().first()),
            param("b", "2", ParamOption::default()),
        ]);
        let keys: Vec<_> = ordered.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["ts", "a", "b", "z", "ref"]);
    }

    #[test]
    fn test_appended_values_joined_with_separator() {
        let ctx = context(config());
        let mut p = param("ati", "a", ParamOption::default().encode());
        p.values.push(ValueSource::from("b"));
        let builder = Builder::new(ctx, vec![], vec![p]);
        let query = builder.prepare_query();
        assert_eq!(query[0].formatted, "&ati=a%2Cb");
        assert_eq!(query[0].separator, "%2C");
    }

    #[test]
    fn test_json_values_deep_merge() {
        let ctx = context(config());
        let mut stc = param("stc", json!({"a": {"x": 1}, "list": [1]}), ParamOption::default());
        stc.values.push(ValueSource::from(json!({"a": {"y": 2}, "list": [2]})));
        let builder = Builder::new(ctx, vec![], vec![stc]);

        let query = builder.prepare_query();
        let value: Value = serde_json::from_str(query[0].value()).unwrap();
        assert_eq!(value, json!({"a": {"x": 1, "y": 2}, "list": [1, 2]}));
    }

    #[test]
    fn test_user_id_transforms() {
        let ctx = context(config().with(keys::HASH_USER_ID, "true"));
        let builder = Builder::new(ctx.clone(), vec![], vec![param("idclient", "abc", ParamOption::default())]);
        assert_eq!(builder.prepare_query()[0].value(), sha256_hex("abc"));

        ctx.technical().set_do_not_track(true);
        assert_eq!(builder.prepare_query()[0].value(), "opt-out");
    }

    #[test]
    fn test_referrer_sanitized() {
        let ctx = context(config());
        let builder = Builder::new(ctx, vec![], vec![param("ref", "a&b<c>d", ParamOption::default())]);
        assert_eq!(builder.prepare_query()[0].formatted, "&ref=abcd");
    }

    #[test]
    fn test_tvt_plugin_merges_into_stc() {
        struct Spot;
        impl Plugin for Spot {
            fn execute(&mut self) {}
            fn response(&self) -> String {
                r#"{"tvtracking":{"channel":"tf1"}}"#.to_string()
            }
        }

        let ctx = context(config());
        ctx.plugins()
            .register(TV_TRACKING_PLUGIN, |_: &TrackerConfig| Box::new(Spot) as Box<dyn Plugin>);
        let builder = Builder::new(
            ctx,
            vec![],
            vec![
                param("tvt", true, ParamOption::default()),
                param("stc", json!({"app": "demo"}), ParamOption::default()),
            ],
        );

        let query = builder.prepare_query();
        assert_eq!(query.len(), 1);
        let value: Value = serde_json::from_str(query[0].value()).unwrap();
        assert_eq!(value, json!({"app": "demo", "tvtracking": {"channel": "tf1"}}));
    }

    #[test]
    fn test_params_overflow_into_new_fragment() {
        let max = reference_max_size(PREFIX.len(), "user-1".len());
        let big = "x".repeat(max - 10);
        let params = vec![
            formatted("idclient", "user-1"),
            formatted("a", &big),
            formatted("b", &big),
        ];
        let (hits, issues) = assemble_hits(PREFIX, &params);
        assert!(issues.is_empty());
        assert_eq!(hits.len(), 3);
        assert!(hits[0].starts_with(&format!("{PREFIX}&mh=1-3-")));
        assert!(hits[1].contains("&idclient=user-1&a="));
        assert!(hits[2].contains("&idclient=user-1&b="));
    }

    #[test]
    fn test_slice_ready_param_is_split() {
        let chunks: Vec<String> = (0..400).map(|i| format!("item{i}")).collect();
        let value = chunks.join(",");
        let params = vec![formatted("idclient", "user-1"), formatted("ati", &value), formatted("p", "home")];

        let (hits, issues) = assemble_hits(PREFIX, &params);
        assert!(issues.is_empty());
        assert!(hits.len() > 1);
        assert!(hits.iter().all(|h| h.len() <= HIT_MAX_LENGTH));

        let rebuilt: Vec<String> = hits
            .iter()
            .filter_map(|h| {
                let start = h.find("&ati=")? + "&ati=".len();
                let rest = &h[start..];
                Some(rest.split('&').next().unwrap_or_default().to_string())
            })
            .collect();
        assert_eq!(rebuilt.join(","), value);
        assert!(hits.last().unwrap().ends_with("&p=home"));
    }

    #[test]
    fn test_non_sliceable_oversized_param() {
        let max = reference_max_size(PREFIX.len(), 0);
        let params = vec![
            formatted("p", "home"),
            formatted("x", &"y".repeat(max + 1)),
            formatted("after", "1"),
        ];
        let (hits, issues) = assemble_hits(PREFIX, &params);
        assert_eq!(hits, vec![format!("{PREFIX}&p=home{MHERR}")]);
        assert!(matches!(issues[0], BuildIssue::Error(_)));
    }

    #[test]
    fn test_unsplittable_chunk_is_truncated() {
        let max = reference_max_size(PREFIX.len(), 0);
        let value = format!("a,{}", "%2C".repeat(max));
        let params = vec![formatted("stc", &value), formatted("after", "1")];

        let (hits, issues) = assemble_hits(PREFIX, &params);
        assert_eq!(issues.len(), 1);
        let last = hits.last().unwrap();
        assert!(last.ends_with(MHERR));
        assert!(!last.contains("&after=1"));
        let body = &last[..last.len() - MHERR.len()];
        assert!(body.ends_with("%2C"));
        assert!(last.len() <= HIT_MAX_LENGTH);
    }

    #[test]
    fn test_too_many_fragments_replaced() {
        let max = reference_max_size(PREFIX.len(), 0);
        let params: Vec<FormattedParam> = (0..1001)
            .map(|i| formatted(&format!("k{i}"), &"v".repeat(max - 10)))
            .collect();
        let (hits, issues) = assemble_hits(PREFIX, &params);
        assert_eq!(hits.len(), 1001);
        assert_eq!(hits[999], format!("{PREFIX}{MHERR}"));
        assert_eq!(hits[1000], format!("{PREFIX}{MHERR}"));
        assert!(hits[998].contains("&mh=999-1001-"));
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn test_long_user_id_reserved_in_budget() {
        let user_id = sha256_hex("visitor");
        assert!(reference_max_size(PREFIX.len(), user_id.len()) < reference_max_size(PREFIX.len(), 0));
        assert_eq!(
            reference_max_size(PREFIX.len(), 4),
            reference_max_size(PREFIX.len(), 0)
        );

        let value = vec!["a"; 12_000].join(",");
        let params = vec![formatted("idclient", &user_id), formatted("ati", &value)];
        let (hits, issues) = assemble_hits(PREFIX, &params);
        assert!(issues.is_empty());
        assert!(hits.len() > 10);
        for hit in &hits {
            assert!(hit.len() <= HIT_MAX_LENGTH, "fragment of {} bytes", hit.len());
            assert!(hit.contains(&format!("&idclient={user_id}")));
        }
    }

    #[test]
    fn test_multibyte_chunk_truncated_without_panic() {
        let params = vec![formatted("ati", &"é".repeat(1000))];
        let (hits, issues) = assemble_hits(PREFIX, &params);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].ends_with(MHERR));
        assert!(hits[0].len() <= HIT_MAX_LENGTH);
        assert!(matches!(issues[0], BuildIssue::Error(_)));
    }
}
