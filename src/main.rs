use clap::Parser;
use gamejam::cli::Cli;
use gamejam::config::AppConfig;
use gamejam::context::AppContext;
use gamejam::error::JamError;
use gamejam::logging::init_logging;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config_dir)?;
    let _log_guard = init_logging(&config.logging);

    if let Err(problems) = config.validate() {
        for problem in &problems {
            error!("Invalid configuration: {}", problem);
        }
        anyhow::bail!("configuration has {} problem(s)", problems.len());
    }
    info!(
        "gamejam {} starting (dry run: {})",
        env!("CARGO_PKG_VERSION"),
        config.is_dry_run()
    );

    let ctx = AppContext::from_config(config).await?;
    let outcome = cli.run(&ctx).await;
    ctx.shutdown().await;

    if let Err(e) = outcome {
        // precondition failures are answers, not crashes
        if let Some(jam_error) = e.downcast_ref::<JamError>() {
            if jam_error.is_user_facing() {
                eprintln!("\x1b[33m✗ {}\x1b[0m ({})", jam_error, jam_error.message_key());
                std::process::exit(2);
            }
        }
        return Err(e);
    }
    Ok(())
}
