use anyhow::Result;
use pxscraper::{
    error::PipelineError,
    fetch::PxClient,
    pipeline::{self, run_table},
    tables,
};
use std::fs;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();
    info!("startup");

    // ─── 2) configure client and output dir ──────────────────────────
    let bases = pipeline::api_bases();
    let out_dir = pipeline::out_dir();
    fs::create_dir_all(&out_dir)?;
    let client = PxClient::new(bases)?;

    // ─── 3) run every table fetch sequentially ───────────────────────
    let configs = tables::all();
    info!(tables = configs.len(), out = %out_dir.display(), "starting fetches");

    let mut written = 0usize;
    let mut skipped = 0usize;
    let mut failed = 0usize;

    for cfg in &configs {
        match run_table(&client, cfg, &out_dir).await {
            Ok(summary) => {
                info!(
                    dataset = %summary.dataset_id,
                    records = summary.records,
                    periods = summary.periods,
                    "done"
                );
                written += 1;
            }
            // a Skip means the table had nothing applicable; not a failure
            Err(PipelineError::Skip { reason }) => {
                warn!(dataset = %cfg.dataset_id, %reason, "skipped");
                skipped += 1;
            }
            Err(err) => {
                error!(dataset = %cfg.dataset_id, %err, "table fetch failed");
                failed += 1;
            }
        }
    }

    info!(written, skipped, failed, "all done");
    if written == 0 && failed > 0 {
        anyhow::bail!("every table fetch failed");
    }
    Ok(())
}
