use school_manager_cli::{
    app::{App, Status},
    cli::{self, Action},
    config::CliConfig,
    error::CliError,
};
use school_manager_core::Result;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli::command().get_matches();

    let filter = if matches.get_flag("verbose") {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "info".into())
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_file = matches.get_one::<PathBuf>("config").cloned();
    match run(Action::from_matches(&matches), config_file).await {
        Ok(Status::Success) => ExitCode::SUCCESS,
        Ok(Status::Failure) => ExitCode::FAILURE,
        Err(report) => {
            eprintln!("error: {report}");
            ExitCode::FAILURE
        }
    }
}

async fn run(
    action: std::result::Result<Action, CliError>,
    config_file: Option<PathBuf>,
) -> Result<Status, CliError> {
    let action = action?;
    let config = CliConfig::load(config_file.as_deref()).map_err(|e| CliError::Config {
        details: e.to_string(),
    })?;
    tracing::debug!(cache = %config.cache_path.display(), "loaded configuration");

    let app = App::build(&config)?;
    let state = app.restore().await;
    tracing::debug!(?state, "restored session");

    let mut stdout = std::io::stdout().lock();
    app.run(action, &mut stdout).await
}
