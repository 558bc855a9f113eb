//! jarvis-orchestrate binary
//!
//! Prints the JSON report on stdout (or `--output`), the human summary and
//! all logs on stderr. Exits 0 iff at least one model succeeded.

use clap::Parser;
use jarvis_orchestrator::cli::{Cli, Command, generate_config_template};
use jarvis_orchestrator::config::Config;
use jarvis_orchestrator::error::{AppError, AppResult};
use jarvis_orchestrator::metrics::Metrics;
use jarvis_orchestrator::orchestrator::Orchestrator;
use jarvis_orchestrator::providers::{ProviderRegistry, ReqwestTransport, Transport};
use jarvis_orchestrator::telemetry;
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Orchestration aborted");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> AppResult<ExitCode> {
    if let Some(Command::Config { output }) = &cli.command {
        let template = generate_config_template();
        match output {
            Some(path) => {
                std::fs::write(path, template).map_err(|source| AppError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                eprintln!("Configuration template written to {}", path.display());
            }
            None => print!("{}", template),
        }
        return Ok(ExitCode::SUCCESS);
    }

    let env = |key: &str| std::env::var(key).ok();

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_env(env);
    if cli.mock {
        config.mock.enabled = true;
    }
    config.validate()?;

    telemetry::init(&config.observability.log_level);

    tracing::info!(
        config_file = cli.config.as_deref().unwrap_or("<built-in defaults>"),
        mock = config.mock.enabled,
        providers = ?config.provider_names(),
        "Configuration loaded"
    );

    let request = cli.prompt_request()?;
    let models = cli.models(&config);

    let metrics = Arc::new(
        Metrics::new().map_err(|e| AppError::Internal(format!("Failed to create metrics: {}", e)))?,
    );
    let transport: Arc<dyn Transport> = Arc::new(
        ReqwestTransport::new()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?,
    );
    let registry = Arc::new(ProviderRegistry::from_config(&config, transport, env)?);

    let orchestrator = Orchestrator::new(registry, config.orchestration.clone(), metrics.clone());
    let result = orchestrator
        .orchestrate(
            &models,
            &request,
            cli.timeout_ms(&config),
            cli.retries(&config),
        )
        .await?;

    let json = serde_json::to_string_pretty(&result.to_report())?;
    match &cli.output {
        Some(path) => {
            std::fs::write(path, format!("{}\n", json)).map_err(|source| AppError::Io {
                path: path.display().to_string(),
                source,
            })?;
            tracing::info!(path = %path.display(), "Report written");
        }
        None => println!("{}", json),
    }

    eprint!("{}", result.render_summary());

    if cli.metrics {
        match metrics.gather() {
            Ok(text) => eprint!("{}", text),
            Err(e) => tracing::warn!(error = %e, "Failed to render metrics"),
        }
    }

    Ok(if result.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
