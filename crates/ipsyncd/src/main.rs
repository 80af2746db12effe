// # ipsyncd - Registry/Poller sync runner
//
// Thin integration layer over ipsync-core. Every reconciliation rule lives in
// the core crate; this binary only:
// 1. Reads configuration from environment variables
// 2. Installs logging
// 3. Registers the built-in backends
// 4. Runs the engine once and maps the outcome to an exit status
//
// ## Configuration
//
// ### Registry (NetBox)
// - `IPSYNC_REGISTRY_URL`: Base URL
// - `IPSYNC_REGISTRY_TOKEN`: API token for reads (and writes by default)
// - `IPSYNC_REGISTRY_WRITE_TOKEN`: Optional separate write token
//
// ### Poller (LibreNMS)
// - `IPSYNC_POLLER_URL`: Base URL
// - `IPSYNC_POLLER_TOKEN`: API token
//
// ### Transport
// - `IPSYNC_VERIFY_TLS`: Verify TLS certificates (default true)
// - `IPSYNC_HTTP_TIMEOUT_SECS`: Per-request timeout (default 30)
//
// ### Run
// - `IPSYNC_PATCH_WHEN_EMPTY`: Submit the update even when it has no entries (default true)
// - `IPSYNC_MODE`: `live` (default) or `dry-run`
// - `IPSYNC_LOG_LEVEL`: trace, debug, info, warn, error (default info)
// - `IPSYNC_LOG_FILE`: Append logs to this file instead of stdout
//
// ## Example
//
// ```bash
// export IPSYNC_REGISTRY_URL=https://netbox.example.com/
// export IPSYNC_REGISTRY_TOKEN=0123456789abcdef0123456789abcdef01234567
// export IPSYNC_POLLER_URL=https://librenms.example.com/
// export IPSYNC_POLLER_TOKEN=abcdef0123456789abcdef0123456789
// export IPSYNC_LOG_FILE=/var/log/ipsync.log
//
// ipsyncd
// ```

use anyhow::{Context, Result};
use ipsync_core::{
    BackendRegistry, EngineConfig, PollerConfig, RegistryConfig, RunOutcome, RunReport, SyncConfig,
    SyncEngine, SyncEvent, TransportConfig,
};
use std::env;
use std::fs::OpenOptions;
use std::process::ExitCode;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;

/// Exit codes for the possible run results
///
/// - 0: Every step succeeded
/// - 1: Configuration or startup error
/// - 2: A fetch failed and the run was aborted
/// - 3: The run completed but a write failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IpsyncExitCode {
    Success = 0,
    ConfigError = 1,
    Aborted = 2,
    Partial = 3,
}

impl From<IpsyncExitCode> for ExitCode {
    fn from(code: IpsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

impl From<RunOutcome> for IpsyncExitCode {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Success => IpsyncExitCode::Success,
            RunOutcome::Partial => IpsyncExitCode::Partial,
            RunOutcome::Aborted => IpsyncExitCode::Aborted,
        }
    }
}

/// Application configuration, as read from the environment
struct Config {
    registry_url: String,
    registry_token: String,
    registry_write_token: Option<String>,
    poller_url: String,
    poller_token: String,
    verify_tls: bool,
    http_timeout_secs: u64,
    patch_when_empty: bool,
    mode: String,
    log_level: String,
    log_file: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| lookup(key).with_context(|| format!("{} is required", key));

        Ok(Self {
            registry_url: required("IPSYNC_REGISTRY_URL")?,
            registry_token: required("IPSYNC_REGISTRY_TOKEN")?,
            registry_write_token: lookup("IPSYNC_REGISTRY_WRITE_TOKEN").filter(|t| !t.is_empty()),
            poller_url: required("IPSYNC_POLLER_URL")?,
            poller_token: required("IPSYNC_POLLER_TOKEN")?,
            verify_tls: parse_bool("IPSYNC_VERIFY_TLS", lookup("IPSYNC_VERIFY_TLS"), true)?,
            http_timeout_secs: match lookup("IPSYNC_HTTP_TIMEOUT_SECS") {
                Some(value) => value
                    .trim()
                    .parse()
                    .with_context(|| format!("IPSYNC_HTTP_TIMEOUT_SECS must be a number. Got: {}", value))?,
                None => 30,
            },
            patch_when_empty: parse_bool(
                "IPSYNC_PATCH_WHEN_EMPTY",
                lookup("IPSYNC_PATCH_WHEN_EMPTY"),
                true,
            )?,
            mode: lookup("IPSYNC_MODE").unwrap_or_else(|| "live".to_string()),
            log_level: lookup("IPSYNC_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_file: lookup("IPSYNC_LOG_FILE").filter(|p| !p.is_empty()),
        })
    }

    /// Validate the values that the core configuration does not cover
    fn validate(&self) -> Result<()> {
        match self.mode.to_lowercase().as_str() {
            "live" | "dry-run" => {}
            _ => anyhow::bail!(
                "IPSYNC_MODE '{}' is not valid. Valid modes: live, dry-run",
                self.mode
            ),
        }

        if !(1..=600).contains(&self.http_timeout_secs) {
            anyhow::bail!(
                "IPSYNC_HTTP_TIMEOUT_SECS must be between 1 and 600 seconds. Got: {}",
                self.http_timeout_secs
            );
        }

        if parse_level(&self.log_level).is_none() {
            anyhow::bail!(
                "IPSYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            );
        }

        Ok(())
    }

    fn dry_run(&self) -> bool {
        self.mode.eq_ignore_ascii_case("dry-run")
    }

    /// Build the core configuration and validate it
    fn to_sync_config(&self) -> Result<SyncConfig> {
        let sync_config = SyncConfig {
            registry: RegistryConfig::Netbox {
                url: self.registry_url.clone(),
                token: self.registry_token.clone(),
                write_token: self.registry_write_token.clone(),
                dry_run: self.dry_run(),
            },
            poller: PollerConfig::Librenms {
                url: self.poller_url.clone(),
                token: self.poller_token.clone(),
            },
            transport: TransportConfig {
                verify_tls: self.verify_tls,
                timeout_secs: self.http_timeout_secs,
            },
            engine: EngineConfig {
                patch_when_empty: self.patch_when_empty,
                ..EngineConfig::default()
            },
        };

        sync_config.validate()?;
        Ok(sync_config)
    }
}

fn parse_bool(key: &str, value: Option<String>, default: bool) -> Result<bool> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("{} must be true or false. Got: {}", key, value),
    }
}

fn parse_level(level: &str) -> Option<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Install the global subscriber, appending to a file when one is configured
fn init_tracing(config: &Config) -> Result<()> {
    let log_level = parse_level(&config.log_level).unwrap_or(Level::INFO);

    match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open IPSYNC_LOG_FILE {}", path))?;

            let subscriber = FmtSubscriber::builder()
                .with_max_level(log_level)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        None => {
            let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return IpsyncExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return IpsyncExitCode::ConfigError.into();
    }

    if let Err(e) = init_tracing(&config) {
        eprintln!("Failed to initialize logging: {:#}", e);
        return IpsyncExitCode::ConfigError.into();
    }

    let sync_config = match config.to_sync_config() {
        Ok(sync_config) => sync_config,
        Err(e) => {
            error!("Configuration validation error: {}", e);
            return IpsyncExitCode::ConfigError.into();
        }
    };

    info!("Starting ipsyncd [mode: {}]", config.mode);

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return IpsyncExitCode::ConfigError.into();
        }
    };

    let code = rt.block_on(async {
        match run(&sync_config).await {
            Ok(report) => IpsyncExitCode::from(report.outcome),
            Err(e) => {
                error!("Startup error: {:#}", e);
                IpsyncExitCode::ConfigError
            }
        }
    });

    code.into()
}

/// Log sync events while the run is in progress
///
/// Resolves to the number of events seen once every sender is gone.
fn spawn_event_logger(mut event_rx: mpsc::Receiver<SyncEvent>) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut events = 0;
        while let Some(event) = event_rx.recv().await {
            debug!("Sync event: {:?}", event);
            events += 1;
        }
        events
    })
}

/// Build the backends and run the engine once
async fn run(sync_config: &SyncConfig) -> Result<RunReport> {
    let backends = BackendRegistry::new();

    #[cfg(feature = "netbox")]
    ipsync_registry_netbox::register(&backends);

    #[cfg(feature = "librenms")]
    ipsync_poller_librenms::register(&backends);

    debug!("Registered registries: {:?}", backends.list_registries());
    debug!("Registered pollers: {:?}", backends.list_pollers());

    let registry = backends.create_registry(&sync_config.registry, &sync_config.transport)?;
    let poller = backends.create_poller(&sync_config.poller, &sync_config.transport)?;

    let (engine, event_rx) = SyncEngine::new(registry, poller, &sync_config.engine)?;
    let event_logger = spawn_event_logger(event_rx);

    let report = engine.run_once().await;

    // Dropping the engine closes the channel so the logger can finish
    drop(engine);
    match event_logger.await {
        Ok(events) => debug!("Observed {} sync event(s)", events),
        Err(e) => debug!("Event logger stopped early: {}", e),
    }

    let elapsed = report.finished_at - report.started_at;
    info!(
        "Run finished in {} ms with outcome {:?}",
        elapsed.num_milliseconds(),
        report.outcome
    );

    Ok(report)
}
