// # stockwatchd - Availability Monitor Daemon
//
// Thin integration layer: everything the monitor does lives in
// stockwatch-core and the plug-in crates. The daemon
//
// 1. Reads configuration from the environment (and an optional JSON file)
// 2. Installs the tracing subscriber
// 3. Registers sources, channels and history stores
// 4. Starts the monitor and waits for SIGTERM/SIGINT
//
// ## Configuration
//
// ### Rules
// - `STOCKWATCH_CONFIG_PATH`: JSON monitor configuration (channel, interval,
//   rules with their history). Without it the daemon runs with no rules.
//
// ### Source
// - `STOCKWATCH_SOURCE_TYPE`: `ovh` (default) or `static`
// - `STOCKWATCH_SOURCE_URL`: Endpoint override for the OVH source
//
// ### History
// - `STOCKWATCH_HISTORY_TYPE`: `file` (default) or `memory`
// - `STOCKWATCH_HISTORY_PATH`: Path to the history file (for file)
//
// ### Monitor
// - `STOCKWATCH_CHECK_INTERVAL`: Seconds between checks, overrides the file
// - `STOCKWATCH_NOTIFY_TIMEOUT_SECS`: Upper bound per notification
//
// ### Telegram
// - `STOCKWATCH_TELEGRAM_BOT_TOKEN`, `STOCKWATCH_TELEGRAM_CHAT_ID`: when both
//   are set they override the file and enable the channel
//
// ### Logging
// - `STOCKWATCH_LOG_LEVEL`: trace, debug, info (default), warn, error
//
// ## Example
//
// ```bash
// export STOCKWATCH_CONFIG_PATH=/etc/stockwatch/config.json
// export STOCKWATCH_HISTORY_PATH=/var/lib/stockwatch/history.json
// export STOCKWATCH_TELEGRAM_BOT_TOKEN=123456:ABC...
// export STOCKWATCH_TELEGRAM_CHAT_ID=987654
//
// stockwatchd
// ```

use anyhow::{Context, Result};
use std::env;
use std::process::ExitCode;
use std::time::Duration;
use stockwatch_core::{
    ComponentRegistry, EngineConfig, HistoryStoreConfig, Monitor, MonitorConfig, MonitorEvent,
    SourceConfig,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Upper bound on waiting for the in-flight cycle at shutdown
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// How long the event logger may keep draining after the monitor is dropped
const EVENT_LOGGER_GRACE: Duration = Duration::from_secs(5);

/// Exit codes, following systemd conventions
#[derive(Debug, Clone, Copy)]
enum StockwatchExitCode {
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Unexpected failure while running
    RuntimeError = 2,
}

impl From<StockwatchExitCode> for ExitCode {
    fn from(code: StockwatchExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Daemon configuration
///
/// Holds the bot token, so it has no `Debug`.
struct Config {
    config_path: Option<String>,
    source_type: String,
    source_url: Option<String>,
    history_type: String,
    history_path: Option<String>,
    check_interval: Option<u64>,
    telegram_bot_token: Option<String>,
    telegram_chat_id: Option<String>,
    notify_timeout_secs: Option<u64>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let number = |key: &str| -> Result<Option<u64>> {
            var(key)
                .map(|value| {
                    value
                        .trim()
                        .parse::<u64>()
                        .with_context(|| format!("{} must be a whole number. Got: {}", key, value))
                })
                .transpose()
        };

        Ok(Self {
            config_path: var("STOCKWATCH_CONFIG_PATH"),
            source_type: var("STOCKWATCH_SOURCE_TYPE").unwrap_or_else(|| "ovh".to_string()),
            source_url: var("STOCKWATCH_SOURCE_URL"),
            history_type: var("STOCKWATCH_HISTORY_TYPE").unwrap_or_else(|| "file".to_string()),
            history_path: var("STOCKWATCH_HISTORY_PATH"),
            check_interval: number("STOCKWATCH_CHECK_INTERVAL")?,
            telegram_bot_token: var("STOCKWATCH_TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: var("STOCKWATCH_TELEGRAM_CHAT_ID"),
            notify_timeout_secs: number("STOCKWATCH_NOTIFY_TIMEOUT_SECS")?,
            log_level: var("STOCKWATCH_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate values that do not need the filesystem
    fn validate(&self) -> Result<()> {
        match self.source_type.as_str() {
            "ovh" | "static" => {}
            _ => anyhow::bail!(
                "STOCKWATCH_SOURCE_TYPE '{}' is not supported. Supported types: ovh, static",
                self.source_type
            ),
        }

        if self.source_url.is_some() && self.source_type != "ovh" {
            anyhow::bail!("STOCKWATCH_SOURCE_URL only applies to STOCKWATCH_SOURCE_TYPE=ovh");
        }

        match self.history_type.as_str() {
            "memory" => {}
            "file" => {
                if self.history_path.is_none() {
                    anyhow::bail!(
                        "STOCKWATCH_HISTORY_PATH is required when STOCKWATCH_HISTORY_TYPE=file. \
                        Set it via: export STOCKWATCH_HISTORY_PATH=/var/lib/stockwatch/history.json"
                    );
                }
            }
            _ => anyhow::bail!(
                "STOCKWATCH_HISTORY_TYPE '{}' is not supported. Supported types: file, memory",
                self.history_type
            ),
        }

        if let Some(interval) = self.check_interval
            && interval == 0
        {
            anyhow::bail!("STOCKWATCH_CHECK_INTERVAL must be greater than 0");
        }

        if let Some(timeout) = self.notify_timeout_secs
            && !(1..=300).contains(&timeout)
        {
            anyhow::bail!(
                "STOCKWATCH_NOTIFY_TIMEOUT_SECS must be between 1 and 300 seconds. Got: {}",
                timeout
            );
        }

        if self.telegram_bot_token.is_some() != self.telegram_chat_id.is_some() {
            anyhow::bail!(
                "STOCKWATCH_TELEGRAM_BOT_TOKEN and STOCKWATCH_TELEGRAM_CHAT_ID must be set together"
            );
        }

        self.level()?;
        Ok(())
    }

    fn level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "STOCKWATCH_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }

    fn source_config(&self) -> SourceConfig {
        match (self.source_type.as_str(), &self.source_url) {
            ("static", _) => SourceConfig::Static {
                resources: Vec::new(),
            },
            (_, Some(url)) => SourceConfig::Ovh { url: url.clone() },
            _ => SourceConfig::default(),
        }
    }

    fn history_config(&self) -> HistoryStoreConfig {
        match (self.history_type.as_str(), &self.history_path) {
            ("file", Some(path)) => HistoryStoreConfig::File { path: path.clone() },
            _ => HistoryStoreConfig::Memory,
        }
    }

    fn engine_config(&self) -> EngineConfig {
        let mut engine = EngineConfig::default();
        if let Some(timeout) = self.notify_timeout_secs {
            engine.notify_timeout_secs = timeout;
        }
        engine
    }

    /// Build the monitor configuration: file first, environment on top
    fn monitor_config(&self) -> Result<MonitorConfig> {
        let mut config = match &self.config_path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read STOCKWATCH_CONFIG_PATH {}", path))?;
                serde_json::from_str::<MonitorConfig>(&raw)
                    .with_context(|| format!("Invalid monitor configuration in {}", path))?
            }
            None => MonitorConfig::default(),
        };
        self.apply_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut MonitorConfig) {
        if let Some(interval) = self.check_interval {
            config.check_interval_secs = interval;
        }

        if let (Some(token), Some(chat_id)) = (&self.telegram_bot_token, &self.telegram_chat_id) {
            config.channel.kind = "telegram".to_string();
            config.channel.enabled = true;
            config.channel.credential = token.clone();
            config.channel.destination = chat_id.clone();
        }
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return StockwatchExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return StockwatchExitCode::ConfigError.into();
    }

    let log_level = config.level().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return StockwatchExitCode::ConfigError.into();
    }

    let monitor_config = match config.monitor_config() {
        Ok(monitor_config) => monitor_config,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            return StockwatchExitCode::ConfigError.into();
        }
    };

    info!("Starting stockwatchd daemon");
    info!(
        "Configuration loaded: {} rule(s), {} enabled, checking every {}s",
        monitor_config.rules.len(),
        monitor_config.enabled_rules(),
        monitor_config.check_interval_secs
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return StockwatchExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match run_daemon(config, monitor_config).await {
            Ok(()) => StockwatchExitCode::CleanShutdown,
            Err(DaemonError::Startup(e)) => {
                error!("Startup error: {:#}", e);
                StockwatchExitCode::ConfigError
            }
            Err(DaemonError::Runtime(e)) => {
                error!("Daemon error: {:#}", e);
                StockwatchExitCode::RuntimeError
            }
        }
    })
    .into()
}

/// Distinguishes failures that map to different exit codes
enum DaemonError {
    Startup(anyhow::Error),
    Runtime(anyhow::Error),
}

/// Build the registry with every compiled-in component
fn build_registry() -> ComponentRegistry {
    let registry = ComponentRegistry::with_builtins();

    #[cfg(feature = "ovh")]
    {
        debug!("Registering OVH source");
        stockwatch_source_ovh::register(&registry);
    }

    #[cfg(feature = "telegram")]
    {
        debug!("Registering Telegram channel");
        stockwatch_notify_telegram::register(&registry);
    }

    registry
}

/// Run the daemon
async fn run_daemon(
    config: Config,
    monitor_config: MonitorConfig,
) -> std::result::Result<(), DaemonError> {
    let registry = build_registry();

    let (monitor, events) = build_monitor(&registry, &config, &monitor_config)
        .await
        .map_err(DaemonError::Startup)?;

    if monitor_config.enabled_rules() == 0 {
        warn!("No enabled watch rules; the monitor will fetch but never notify");
    }
    if !monitor_config.channel.is_deliverable() {
        warn!("Notification channel is disabled or incomplete; changes are only logged");
    }

    let event_logger = tokio::spawn(log_events(events));

    monitor
        .start(monitor_config)
        .await
        .map_err(|e| DaemonError::Startup(e.into()))?;
    info!("Monitor started");

    let signal = wait_for_shutdown()
        .await
        .map_err(DaemonError::Runtime)?;
    info!("Received shutdown signal: {}", signal);
    info!("Shutting down daemon");

    let shutdown = tokio::time::timeout(SHUTDOWN_TIMEOUT, monitor.shutdown()).await;
    // The logger ends once every sender is gone. A timer task stuck past the
    // shutdown timeout still holds one.
    drop(monitor);
    finish_event_logger(event_logger, EVENT_LOGGER_GRACE).await;

    match shutdown {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(DaemonError::Runtime(e.into())),
        Err(_) => Err(DaemonError::Runtime(anyhow::anyhow!(
            "Shutdown timeout after {:?}",
            SHUTDOWN_TIMEOUT
        ))),
    }
}

async fn build_monitor(
    registry: &ComponentRegistry,
    config: &Config,
    monitor_config: &MonitorConfig,
) -> Result<(Monitor, mpsc::Receiver<MonitorEvent>)> {
    let source_config = config.source_config();
    let history_config = config.history_config();
    info!("Inventory source: {}", source_config.type_name());
    info!("History store: {}", history_config.type_name());
    info!("Notification channel: {}", monitor_config.channel.kind);

    let source = registry
        .create_source(&source_config)
        .context("Failed to create inventory source")?;
    let channel = registry
        .create_channel(&monitor_config.channel)
        .context("Failed to create notification channel")?;
    let store = registry
        .create_store(&history_config)
        .await
        .context("Failed to create history store")?;

    let (monitor, events) = Monitor::new(source, channel, store, config.engine_config())?;
    Ok((monitor, events))
}

/// Surface monitor events in the log
///
/// The monitor logs transitions and notifications itself; this adds the
/// per-cycle summary.
async fn log_events(mut events: mpsc::Receiver<MonitorEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            MonitorEvent::CycleCompleted { report } => info!(
                "Cycle complete: {} resources ({}), {} transitions, {} sent, {} failed",
                report.resources,
                report
                    .origin
                    .map(|origin| origin.to_string())
                    .unwrap_or_else(|| "none".to_string()),
                report.transitions,
                report.notifications_sent,
                report.notifications_failed
            ),
            MonitorEvent::CycleSkipped { reason } => warn!("Cycle skipped: {}", reason),
            other => debug!("Monitor event: {:?}", other),
        }
    }
}

/// Wait for the event logger to drain, aborting it after `grace`
///
/// Returns whether the logger finished on its own.
async fn finish_event_logger(mut handle: JoinHandle<()>, grace: Duration) -> bool {
    match tokio::time::timeout(grace, &mut handle).await {
        Ok(_) => true,
        Err(_) => {
            warn!("Event logger still running after {:?}; aborting it", grace);
            handle.abort();
            false
        }
    }
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for CTRL-C on non-Unix platforms
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_require_history_path() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.source_type, "ovh");
        assert_eq!(config.history_type, "file");
        assert!(config.validate().is_err());

        let config = config_from(&[("STOCKWATCH_HISTORY_PATH", "/tmp/history.json")]).unwrap();
        assert!(config.validate().is_ok());
        assert!(matches!(
            config.history_config(),
            HistoryStoreConfig::File { ref path } if path == "/tmp/history.json"
        ));
        assert!(matches!(config.source_config(), SourceConfig::Ovh { .. }));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(config_from(&[("STOCKWATCH_CHECK_INTERVAL", "soon")]).is_err());

        let invalid = [
            vec![("STOCKWATCH_SOURCE_TYPE", "ftp")],
            vec![("STOCKWATCH_HISTORY_TYPE", "sqlite")],
            vec![("STOCKWATCH_HISTORY_TYPE", "memory"), ("STOCKWATCH_CHECK_INTERVAL", "0")],
            vec![("STOCKWATCH_HISTORY_TYPE", "memory"), ("STOCKWATCH_LOG_LEVEL", "loud")],
            vec![
                ("STOCKWATCH_HISTORY_TYPE", "memory"),
                ("STOCKWATCH_TELEGRAM_BOT_TOKEN", "123:abc"),
            ],
            vec![
                ("STOCKWATCH_HISTORY_TYPE", "memory"),
                ("STOCKWATCH_SOURCE_TYPE", "static"),
                ("STOCKWATCH_SOURCE_URL", "https://example.com"),
            ],
        ];
        for vars in invalid {
            let config = config_from(&vars).unwrap();
            assert!(config.validate().is_err(), "{:?} should be rejected", vars);
        }
    }

    #[test]
    fn test_environment_overrides_file_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "telegramConfig": { "enabled": false, "chatId": "", "botToken": "" },
                "checkIntervalSeconds": 300,
                "watchConfigs": [ { "id": "w1", "filters": { "datacenter": "gra" } } ]
            }"#,
        )
        .unwrap();

        let config = config_from(&[
            ("STOCKWATCH_CONFIG_PATH", path.to_str().unwrap()),
            ("STOCKWATCH_HISTORY_TYPE", "memory"),
            ("STOCKWATCH_CHECK_INTERVAL", "90"),
            ("STOCKWATCH_TELEGRAM_BOT_TOKEN", "123:abc"),
            ("STOCKWATCH_TELEGRAM_CHAT_ID", "42"),
        ])
        .unwrap();
        config.validate().unwrap();

        let monitor_config = config.monitor_config().unwrap();
        assert_eq!(monitor_config.check_interval_secs, 90);
        assert_eq!(monitor_config.rules.len(), 1);
        assert!(monitor_config.channel.is_deliverable());
        assert_eq!(monitor_config.channel.destination, "42");
    }

    #[test]
    fn test_unreadable_config_file_is_an_error() {
        let config = config_from(&[
            ("STOCKWATCH_CONFIG_PATH", "/nonexistent/stockwatch.json"),
            ("STOCKWATCH_HISTORY_TYPE", "memory"),
        ])
        .unwrap();
        assert!(config.monitor_config().is_err());
    }

    #[tokio::test]
    async fn test_builds_monitor_from_static_source() {
        let config = config_from(&[
            ("STOCKWATCH_SOURCE_TYPE", "static"),
            ("STOCKWATCH_HISTORY_TYPE", "memory"),
            ("STOCKWATCH_NOTIFY_TIMEOUT_SECS", "5"),
        ])
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.engine_config().notify_timeout_secs, 5);

        let monitor_config = config.monitor_config().unwrap();
        let registry = build_registry();
        let (monitor, _events) = build_monitor(&registry, &config, &monitor_config)
            .await
            .unwrap();
        assert!(!monitor.status().await.running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_logger_is_bounded_when_a_sender_lingers() {
        let (events_tx, events_rx) = mpsc::channel(4);
        let logger = tokio::spawn(log_events(events_rx));

        let started = tokio::time::Instant::now();
        assert!(!finish_event_logger(logger, EVENT_LOGGER_GRACE).await);
        assert!(started.elapsed() >= EVENT_LOGGER_GRACE);
        drop(events_tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_logger_finishes_once_senders_are_gone() {
        let (events_tx, events_rx) = mpsc::channel(4);
        let logger = tokio::spawn(log_events(events_rx));

        events_tx
            .send(MonitorEvent::CycleSkipped {
                reason: "nothing cached".to_string(),
            })
            .await
            .unwrap();
        drop(events_tx);

        assert!(finish_event_logger(logger, EVENT_LOGGER_GRACE).await);
    }
}
