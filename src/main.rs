use std::{fs::File, path::Path, process::ExitCode};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use daemonize::Daemonize;
use log::{LevelFilter, error, info};
use syslog::{BasicLogger, Facility, Formatter3164};

use vision_pwmd::{application::Application, cli::Cli, config::Config};

const DAEMON_LOG: &str = "/var/tmp/vision_pwmd.log";

fn init_log(level: LevelFilter) -> Result<()> {
    syslog::unix(Formatter3164 {
        facility: Facility::LOG_DAEMON,
        hostname: None,
        process: "vision_pwmd".into(),
        pid: std::process::id(),
    })
    .map_err(|e| anyhow!("{e}"))
    .and_then(|logger| {
        log::set_boxed_logger(Box::new(BasicLogger::new(logger)))
            .map(|()| log::set_max_level(level))
            .map_err(|e| anyhow!("{e}"))
    })
}

fn into_daemon(pid_file: Option<&Path>) -> Result<()> {
    let stdout = File::create(DAEMON_LOG).with_context(|| format!("Failed to create {DAEMON_LOG}"))?;
    let stderr = stdout.try_clone()?;

    let daemon = Daemonize::new().working_directory("/").stdout(stdout).stderr(stderr);
    let daemon = match pid_file {
        Some(path) => daemon.pid_file(path),
        None => daemon,
    };
    daemon.start().map_err(|e| anyhow!("{e}"))
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.clone())?.with_channels(cli.channels.clone());
    if cli.pid_file.is_some() {
        config.pid_file = cli.pid_file.clone();
    }
    Ok(config)
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let level = config.log_level()?;
    if let Err(e) = init_log(level) {
        eprintln!("vision_pwmd: syslog unavailable ({e}), continuing without logging");
    }

    // Reject bad configuration while errors still reach the terminal.
    config.validate().context("Invalid configuration")?;

    if cli.daemonize {
        into_daemon(config.pid_file.as_deref())?;
    }
    info!("vision_pwmd {} starting", env!("CARGO_PKG_VERSION"));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(async {
        Application::builder()
            .with_config(config)
            .build()?
            .run()
            .await
    })
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("vision_pwmd: {e:#}");
            ExitCode::FAILURE
        }
    }
}
