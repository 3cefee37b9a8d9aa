//! Hit Tracker CLI
//!
//! Build and send analytics hits, inspect the offline store and manage the
//! consent mode.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use hit_tracker::{
    context::PRIVACY_FILE,
    core::privacy::DEFAULT_MODE_DURATION_DAYS,
    transparency::create_shared_log_with_persistence,
    ParamOption, ParamValue, Privacy, PrivacyMode, Tracker, TrackerConfig, PRIVACY_DECLARATION,
    VERSION,
};
use tracing_subscriber::EnvFilter;

const STATS_FILE: &str = "transparency.json";

#[derive(Parser)]
#[command(name = "hit-tracker")]
#[command(version = VERSION)]
#[command(about = "Build and deliver analytics hits with offline fallback", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a hit from parameters and send it
    Send {
        /// Hit parameter as key=value (repeatable). JSON objects and arrays are kept as JSON
        #[arg(short, long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,

        /// Percent-encode parameter values
        #[arg(long)]
        encode: bool,
    },

    /// Print the hits that would be sent, without sending them
    Build {
        /// Hit parameter as key=value (repeatable)
        #[arg(short, long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,

        /// Percent-encode parameter values
        #[arg(long)]
        encode: bool,
    },

    /// Inspect or replay hits stored offline
    Offline {
        #[command(subcommand)]
        action: OfflineAction,
    },

    /// Show or change the consent mode
    Privacy {
        #[command(subcommand)]
        action: Option<PrivacyAction>,
    },

    /// Show delivery statistics and offline backlog
    Status,

    /// Show configuration, optionally updating keys first
    Config {
        /// Configuration entry as key=value (repeatable)
        #[arg(long, value_parser = parse_key_val)]
        set: Vec<(String, String)>,
    },
}

#[derive(Subcommand)]
enum OfflineAction {
    /// Number of stored hits
    Count,
    /// List stored hits, oldest first
    List,
    /// Send stored hits now
    Flush {
        /// Send even when storage mode is `always`
        #[arg(long)]
        force: bool,
    },
    /// Delete stored hits
    Clear {
        /// Only delete hits older than this many days
        #[arg(long)]
        older_than_days: Option<i64>,
    },
}

#[derive(Subcommand)]
enum PrivacyAction {
    /// Show the consent notice and current mode
    Show,
    /// Set the consent mode (none, optin, optout, no-consent, exempt)
    Set {
        mode: PrivacyMode,

        /// Days before the mode expires
        #[arg(long, default_value_t = DEFAULT_MODE_DURATION_DAYS)]
        days: i64,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Send { params, encode } => cmd_send(&params, encode),
        Commands::Build { params, encode } => cmd_build(&params, encode),
        Commands::Offline { action } => cmd_offline(action),
        Commands::Privacy { action } => cmd_privacy(action.unwrap_or(PrivacyAction::Show)),
        Commands::Status => cmd_status(),
        Commands::Config { set } => cmd_config(&set),
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hit_tracker=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{s}`"))?;
    if key.is_empty() {
        return Err(format!("empty key in `{s}`"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn load_config() -> Result<TrackerConfig> {
    let config = TrackerConfig::load().context("Failed to load configuration")?;
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }
    Ok(config)
}

fn open_tracker(config: TrackerConfig) -> Result<Tracker> {
    Tracker::new(config).context("Failed to open tracker")
}

fn param_value(raw: &str) -> ParamValue {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(json) if json.is_object() || json.is_array() => ParamValue::Json(json),
        _ => ParamValue::from(raw),
    }
}

fn apply_params(tracker: &Tracker, params: &[(String, String)], encode: bool) {
    let options = if encode {
        ParamOption::default().encode()
    } else {
        ParamOption::default()
    };
    for (key, value) in params {
        tracker.set_param(key, param_value(value), options.clone());
    }
}

fn cmd_send(params: &[(String, String)], encode: bool) -> Result<()> {
    let config = load_config()?;
    if config.get(hit_tracker::keys::SITE).unwrap_or_default().is_empty() {
        bail!("No site configured. Use 'hit-tracker config --set site=<id>' first.");
    }

    let log = create_shared_log_with_persistence(config.data_path().join(STATS_FILE));
    let tracker = open_tracker(config)?;
    tracker.set_delegate(log.clone());

    apply_params(&tracker, params, encode);
    tracker.dispatch();
    tracker.wait_until_idle();

    if let Err(e) = log.save() {
        eprintln!("Warning: Could not save delivery stats: {e}");
    }

    println!("{}", log.summary());
    Ok(())
}

fn cmd_build(params: &[(String, String)], encode: bool) -> Result<()> {
    let tracker = open_tracker(load_config()?)?;
    apply_params(&tracker, params, encode);

    let hits = tracker.build_hits();
    if hits.is_empty() {
        bail!("No hit built, check the configuration with 'hit-tracker config'");
    }
    for hit in hits {
        println!("{hit}");
    }
    Ok(())
}

fn cmd_offline(action: OfflineAction) -> Result<()> {
    let config = load_config()?;
    let log = create_shared_log_with_persistence(config.data_path().join(STATS_FILE));
    let tracker = open_tracker(config)?;
    let storage = tracker.context().storage().clone();

    match action {
        OfflineAction::Count => {
            println!("{}", storage.count()?);
        }
        OfflineAction::List => {
            let hits = storage.get()?;
            if hits.is_empty() {
                println!("No stored hits.");
            }
            for hit in hits {
                println!(
                    "{} [retries: {}] {}",
                    hit.creation_date.format("%Y-%m-%d %H:%M:%S"),
                    hit.retry_count,
                    hit.url
                );
            }
        }
        OfflineAction::Flush { force } => {
            tracker.set_delegate(log.clone());
            let before = storage.count()?;
            let sent = tracker.send_offline_hits(force, false);
            println!("Sent {sent} of {before} stored hits.");
            if let Err(e) = log.save() {
                eprintln!("Warning: Could not save delivery stats: {e}");
            }
        }
        OfflineAction::Clear { older_than_days } => {
            let removed = match older_than_days {
                Some(days) => storage.delete_older_than(Utc::now() - chrono::Duration::days(days))?,
                None => storage.delete_all()?,
            };
            println!("Removed {removed} stored hits.");
        }
    }
    Ok(())
}

fn cmd_privacy(action: PrivacyAction) -> Result<()> {
    let config = load_config()?;
    let privacy = Privacy::with_persistence(config.data_path().join(PRIVACY_FILE));

    match action {
        PrivacyAction::Show => {
            println!("{PRIVACY_DECLARATION}");
            print_mode(&privacy);
        }
        PrivacyAction::Set { mode, days } => {
            privacy.set_mode_for(mode, days);
            privacy.save().context("Failed to save privacy mode")?;
            print_mode(&privacy);
        }
    }
    Ok(())
}

fn print_mode(privacy: &Privacy) {
    println!("Current mode: {}", privacy.current_mode());
    match privacy.expires_at() {
        Some(expires_at) => println!("Expires: {}", expires_at.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("Expires: never"),
    }
}

fn cmd_status() -> Result<()> {
    let config = load_config()?;

    println!("Hit Tracker Status");
    println!("==================");
    println!();
    println!("Configuration:");
    println!("  Site: {}", config.get(hit_tracker::keys::SITE).unwrap_or_default());
    println!("  Secure: {}", config.is_secure());
    println!("  Storage mode: {:?}", config.storage_mode());
    println!("  Data path: {:?}", config.data_path());
    println!();

    let tracker = open_tracker(config.clone())?;
    println!("Consent mode: {}", tracker.privacy().current_mode());
    println!("Stored hits: {}", tracker.context().storage().count()?);
    println!();

    let stats_path = config.data_path().join(STATS_FILE);
    if stats_path.exists() {
        let log = create_shared_log_with_persistence(stats_path);
        println!("Cumulative Statistics:");
        let stats = log.stats();
        println!("  Builds: {} ({} rejected)", stats.builds, stats.builds_failed);
        println!("  Hits sent: {}", stats.hits_sent);
        println!("  Failed attempts: {}", stats.hits_failed);
        println!("  Hits stored offline: {}", stats.hits_saved);
    } else {
        println!("No previous session data found.");
    }
    Ok(())
}

fn cmd_config(set: &[(String, String)]) -> Result<()> {
    let mut config = TrackerConfig::load().context("Failed to load configuration")?;

    if !set.is_empty() {
        for (key, value) in set {
            config.set(key.as_str(), value.as_str());
        }
        config.save().context("Failed to save configuration")?;
    }

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", TrackerConfig::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
