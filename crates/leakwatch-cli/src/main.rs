mod cli;
mod config;
mod error;
mod logging;
mod output;

use std::sync::Arc;

use chromiumoxide::browser::{Browser, BrowserConfig};
use clap::Parser;
use futures_util::StreamExt;
use leakwatch::CrawlSession;
use leakwatch_runtime::{ChromiumDriver, TargetInfo};

use cli::{Cli, Command};
use error::{CliError, Result};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Command::Audit(args) => run_audit(cli.config.as_deref(), args).await,
    };

    if let Err(err) = result {
        tracing::error!(error = %err, "leakwatch audit failed");
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run_audit(config_path: Option<&std::path::Path>, args: &cli::AuditArgs) -> Result<()> {
    let options = config::load(config_path, args)?;

    let driver = Arc::new(launch_driver(args.headed).await?);
    let load_started = std::time::Instant::now();
    let (page, frame) = driver
        .new_page(&args.url)
        .await
        .map_err(|e| CliError::BrowserLaunch(e.to_string()))?;
    let page_load_ms = Some(load_started.elapsed().as_millis() as u64);

    let session = CrawlSession::new(driver, options, &args.url, page_load_ms)?;
    session.add_target(TargetInfo {
        page,
        url: args.url.clone(),
        kind: leakwatch_protocol::TargetKind::Page,
    });

    session.run(page, frame).await?;

    let data = session.get_data();
    output::print_json(&data, args.output.as_deref())?;
    output::print_summary(&args.url, &data);
    Ok(())
}

/// Launches Chrome and spawns the task that drives its CDP event loop,
/// headless or headed.
async fn launch_driver(headed: bool) -> Result<ChromiumDriver> {
    let mut builder = BrowserConfig::builder();
    if !headed {
        builder = builder.arg("--headless=new");
    }
    builder = builder
        .arg("--no-sandbox")
        .arg("--disable-dev-shm-usage");

    let config = builder
        .build()
        .map_err(|e| CliError::BrowserLaunch(format!("invalid browser configuration: {e}")))?;

    let (browser, mut handler) = Browser::launch(config)
        .await
        .map_err(|e| CliError::BrowserLaunch(e.to_string()))?;

    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                tracing::warn!(error = %e, "browser handler error");
            }
        }
    });

    Ok(ChromiumDriver::new(Arc::new(browser)))
}
