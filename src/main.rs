use anyhow::Result;
use clap::Parser;
use minutes_crawler::config::{Cli, Config};
use minutes_crawler::error::CrawlError;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match Config::from_cli(cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(e.exit_code());
        }
    };

    fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match minutes_crawler::run(config).await {
        Ok(_totals) => Ok(()),
        Err(e) => {
            tracing::error!(error = %e, "crawl run failed");
            let exit_code = e.downcast_ref::<CrawlError>().map(|ce| ce.exit_code()).unwrap_or(2);
            std::process::exit(exit_code);
        }
    }
}
