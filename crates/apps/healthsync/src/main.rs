//! healthsync - Incremental wellness data sync
//!
//! Runs the sync engine once or continuously against the local SQLite store.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use chrono::SecondsFormat;
use clap::Parser;
use health::{
    CancelToken, Clock, CollectorRegistry, ConnectAuth, ConnectClient, ConnectCredentials,
    CycleOutcome, Domain, DriverConfig, HealthStore, Orchestrator, RateLimiter, SqliteHealthStore,
    SyncCycle, SyncDriver, SyncRunResult, SyncSettings, SystemClock, Upstream,
};
use log::{error, info, warn};

mod cli;
mod prompt;

use cli::{Cli, Mode};
use prompt::StdinCodePrompt;

fn main() -> ExitCode {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    // Bootstrap config directory
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    let mut settings = match &cli.settings {
        Some(path) => SyncSettings::from_file(path)?,
        None => SyncSettings::load()?,
    };
    cli.apply(&mut settings);

    let db_path = settings.resolved_db_path()?;
    let store: Arc<dyn HealthStore> = Arc::new(SqliteHealthStore::new(&db_path)?);
    info!("Using database at {}", db_path.display());

    if cli.status {
        print_status(store.as_ref(), cli.json)?;
        return Ok(ExitCode::SUCCESS);
    }

    // Load credentials from config file or environment
    let credentials = match ConnectCredentials::load() {
        Ok(creds) => Some(creds),
        Err(e) => {
            warn!("Credentials not found: {}", e);
            if let Some(path) = ConnectCredentials::default_credentials_path() {
                warn!(
                    "Cached tokens will be used if present. To log in, either:\n\
                     1. Place your credentials at: {}\n\
                     2. Or set environment variables: HEALTHSYNC_EMAIL and HEALTHSYNC_PASSWORD",
                    path.display()
                );
            }
            None
        }
    };

    let endpoints = settings.endpoints()?;
    let auth = Arc::new(ConnectAuth::new(
        credentials,
        endpoints.clone(),
        settings.request_timeout(),
    )?);

    if cli.logout {
        auth.logout()?;
        info!("Cached tokens removed");
        return Ok(ExitCode::SUCCESS);
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let client = Arc::new(ConnectClient::new(
        endpoints.api_base.clone(),
        settings.request_timeout(),
    ));
    let limiter = Arc::new(RateLimiter::new(settings.rate_limit(), clock.clone()));
    let upstream = Arc::new(Upstream::new(
        client,
        limiter,
        settings.retry_policy(),
        clock.clone(),
    ));

    let orchestrator = Orchestrator::new(
        auth,
        CollectorRegistry::standard(upstream.clone(), &settings),
        store,
        clock.clone(),
        settings.lookback_days,
    )
    .with_mfa_provider(Arc::new(StdinCodePrompt))
    .with_upload_watermark(upstream);

    let cycle = Arc::new(Reporting {
        inner: orchestrator,
        json: cli.json,
    });
    let driver = SyncDriver::new(cycle, clock, DriverConfig::from_settings(&settings));

    match cli.mode {
        Mode::Single => {
            let result = driver.run_single()?;
            if result.outcome == CycleOutcome::TotalFailure {
                return Ok(ExitCode::FAILURE);
            }
        }
        Mode::Continuous => {
            let cancel = CancelToken::new();
            spawn_ctrl_c_listener(cancel.clone());
            driver.run_continuous(&cancel);
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Prints every cycle's result as it completes
struct Reporting {
    inner: Orchestrator,
    json: bool,
}

impl SyncCycle for Reporting {
    fn run_cycle(&self) -> SyncRunResult {
        let result = self.inner.run();
        if let Err(e) = print_result(&result, self.json) {
            error!("Failed to print result: {}", e);
        }
        result
    }
}

fn print_result(result: &SyncRunResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(result)?);
        return Ok(());
    }

    println!(
        "Run {} finished {}: {}",
        result.run_id,
        result.ended_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        result.outcome.as_str()
    );
    if let Some(err) = &result.auth_error {
        println!("  authentication: {}", err);
    }
    if let Some(upload) = &result.last_upload {
        println!(
            "  last device upload: {}",
            upload.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
    }
    for outcome in &result.domains {
        println!(
            "  {:<18} {:<8} {:>6} records{}",
            outcome.domain.as_str(),
            outcome.status.as_str(),
            outcome.records_collected,
            outcome
                .error
                .as_deref()
                .map(|e| format!("  ({e})"))
                .unwrap_or_default()
        );
    }
    Ok(())
}

fn print_status(store: &dyn HealthStore, json: bool) -> Result<()> {
    let cursors = store.list_cursors()?;
    let recent = store.recent_logs(20)?;

    if json {
        let status = serde_json::json!({
            "cursors": cursors,
            "recent_logs": recent,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{:<18} {:<26} {:<8} {:>8}", "DOMAIN", "SYNCED TO", "STATUS", "RECORDS");
    for domain in Domain::ALL {
        let cursor = cursors.iter().find(|c| c.domain == domain);
        println!(
            "{:<18} {:<26} {:<8} {:>8}",
            domain.as_str(),
            cursor
                .map(|c| c.last_synced_at.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_else(|| "never".to_string()),
            cursor.map(|c| c.last_status.as_str()).unwrap_or("-"),
            store.count_records(domain)?
        );
    }

    println!();
    for entry in recent {
        println!(
            "{} {} {:<18} {:<8} {:>6} {}ms{}",
            entry.started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            &entry.run_id[..entry.run_id.len().min(8)],
            entry.scope.as_str(),
            entry.status.as_str(),
            entry.records_collected,
            entry.duration_ms(),
            entry
                .error_detail
                .as_deref()
                .map(|e| format!("  {e}"))
                .unwrap_or_default()
        );
    }
    Ok(())
}

/// Cancel the loop on the first Ctrl-C; exit immediately on the second
fn spawn_ctrl_c_listener(cancel: CancelToken) {
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                error!("Failed to start signal listener: {}", e);
                return;
            }
        };

        runtime.block_on(async {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            info!("Ctrl-C received, stopping after the current cycle");
            cancel.cancel();

            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Second Ctrl-C, exiting now");
                std::process::exit(130);
            }
        });
    });
}
