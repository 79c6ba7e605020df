use clap::{Args, Parser};
use std::path::PathBuf;
use std::process::ExitCode;

mod config;
mod logging;
mod statsd;

/// HTTP gateway in front of the SonarQube measures API.
#[derive(Parser)]
#[command(version)]
enum CliCommand {
    /// Start the gateway
    Serve(ConfigArgs),
    /// Load and validate the configuration, then print it
    CheckConfig(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    /// YAML config file; defaults and environment variables apply without one
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = CliCommand::parse();

    let args = match &cli {
        CliCommand::Serve(args) | CliCommand::CheckConfig(args) => args,
    };

    let config = match config::Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli {
        CliCommand::CheckConfig(_) => {
            println!("{config:#?}");
            ExitCode::SUCCESS
        }
        CliCommand::Serve(_) => serve(config),
    }
}

fn serve(config: config::Config) -> ExitCode {
    let _sentry = logging::init(config.common.logging.as_ref());

    if let Err(e) = statsd::init(config.common.metrics.as_ref()) {
        tracing::error!(error = %e, "Failed to initialise metrics");
        return ExitCode::FAILURE;
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = rt.block_on(async {
        tokio::select! {
            result = measures_gateway::run(config.gateway) => result,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                Ok(())
            }
        }
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Gateway stopped");
            ExitCode::FAILURE
        }
    }
}
