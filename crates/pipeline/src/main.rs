use anyhow::Context;
use clap::Parser;
use tickmin_core::Config;
use tickmin_pipeline::{Cli, Pipeline, PipelineContext};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("reading configuration")?;
    info!(
        tick_csv_path = %config.tick_csv_path.display(),
        database_url = %config.database_url,
        "tickmin starting"
    );

    let today = chrono::Local::now().date_naive();
    let ctx = PipelineContext::load(config, today)
        .context("loading trading calendar and trading sections")?;
    let pipeline = Pipeline::new(ctx);

    if let Some(day) = cli.single_day {
        let report = pipeline
            .run_once(day)
            .await
            .with_context(|| format!("processing {day}"))?;
        info!(?report, "single day done");
    } else {
        let summary = pipeline
            .run(cli.start_day)
            .await
            .context("pipeline stopped")?;
        info!(
            backfilled = summary.backfilled,
            tailed = summary.tailed,
            "pipeline done"
        );
    }

    Ok(())
}
