use anyhow::Result;
use std::{env, path::PathBuf};
use tabload::{config::Config, pipeline};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) configuration ────────────────────────────────────────────
    let cfg = match env::args().nth(1).map(PathBuf::from) {
        Some(path) => {
            info!(path = %path.display(), "loading config");
            Config::from_path(&path)?
        }
        None => Config::default(),
    };
    info!(
        source_dir = %cfg.source_dir.display(),
        test_mode = cfg.test_mode,
        table = %cfg.database.table,
        "configured"
    );

    // ─── 3) discover, load, aggregate, write ─────────────────────────
    let source = cfg.file_source();
    let report = pipeline::write(None, &cfg, source.as_ref())?;

    info!(
        table = %report.table,
        rows = report.rows,
        columns = report.columns,
        elapsed = ?report.elapsed,
        "all done"
    );
    Ok(())
}
