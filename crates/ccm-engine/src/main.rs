//! Operator CLI for the compliance engine

use anyhow::Context;
use ccm_alert::{AlertDispatcher, ReqwestTransport};
use ccm_core::{
    system_clock, AlertPayload, AlertSeverity, AuditEmitter, Clock, EngineConfig, FinalStatus,
    LogAuditSink,
};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn cli() -> Command {
    let config_arg = Arg::new("config")
        .long("config")
        .short('c')
        .required(true)
        .value_parser(clap::value_parser!(PathBuf))
        .help("Path to the engine TOML configuration");

    Command::new("ccm-engine")
        .version(ccm_engine::VERSION)
        .about("Continuous compliance monitoring engine")
        .subcommand_required(true)
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand(
            Command::new("validate-config")
                .about("Load and validate a configuration, print it as JSON")
                .arg(config_arg.clone()),
        )
        .subcommand(
            Command::new("test-alert")
                .about("Send a test alert through every channel for a severity")
                .arg(config_arg)
                .arg(
                    Arg::new("severity")
                        .long("severity")
                        .required(true)
                        .value_parser(["critical", "warn", "info"])
                        .help("Alert severity, selects the channels"),
                )
                .arg(
                    Arg::new("title")
                        .long("title")
                        .default_value("CCM test alert")
                        .help("Alert title"),
                ),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn load_config(args: &ArgMatches) -> anyhow::Result<EngineConfig> {
    let path = args
        .get_one::<PathBuf>("config")
        .context("--config is required")?;
    EngineConfig::load(path).with_context(|| format!("loading {}", path.display()))
}

fn validate_config(args: &ArgMatches) -> anyhow::Result<bool> {
    let config = load_config(args)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(true)
}

async fn test_alert(args: &ArgMatches) -> anyhow::Result<bool> {
    let config = load_config(args)?;
    let severity: AlertSeverity = args
        .get_one::<String>("severity")
        .context("--severity is required")?
        .parse()
        .map_err(anyhow::Error::msg)?;
    let title = args
        .get_one::<String>("title")
        .map_or("CCM test alert", String::as_str);

    let transport = ReqwestTransport::new().context("building HTTP client")?;
    let audit = AuditEmitter::spawn(Arc::new(LogAuditSink), &config.audit);
    let clock = system_clock();
    let dispatcher = AlertDispatcher::new(
        Arc::new(transport),
        config.alerts.clone(),
        audit.clone(),
        Arc::clone(&clock),
    );

    let payload = AlertPayload::new(
        severity,
        title,
        "Test alert dispatched by ccm-engine test-alert",
        dispatcher.source(),
        clock.now(),
    )
    .with_metadata("test", "true");

    let result = dispatcher.send_alert(&payload).await;
    if let Err(e) = audit.flush().await {
        tracing::warn!(error = %e, "audit flush failed");
    }

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(result.final_status != FinalStatus::Failed)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("json"));

    let ok = match matches.subcommand() {
        Some(("validate-config", args)) => validate_config(args)?,
        Some(("test-alert", args)) => test_alert(args).await?,
        Some((other, _)) => anyhow::bail!("unknown subcommand: {other}"),
        None => anyhow::bail!("a subcommand is required"),
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
