#![warn(unused_extern_crates)]
use activist::{config::AppConfig, pipeline};
use anyhow::Result;
use dotenv::dotenv;
use tracing::info;
use utils::tracing::run_with_tracing;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenv().ok();

    run_with_tracing(|| async {
        let path = AppConfig::resolve_path(std::env::args().nth(1));
        let config = AppConfig::load(&path)?;
        config.validate()?;

        let summary = pipeline::run(&config).await?;
        info!(
            proposals_written = summary.proposals_written,
            total_rows = summary.total_rows,
            output_dir = %config.output.dir.display(),
            "Activist dataset ready"
        );
        Ok(())
    })
    .await
}
