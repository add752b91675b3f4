use anyhow::{Context, Result};
use clap::Parser;
use streamvault::{create_router, AppState, Config};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "streamvault", about = "Live stream recording supervisor")]
struct Args {
    /// Configuration file (without extension)
    #[arg(long, default_value = "config/streamvault")]
    config: String,

    /// Override the configured bind address
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("media root: {}", cfg.recording.media_root);
    info!("ffmpeg: {}", cfg.recording.ffmpeg_path);

    let addr = match &args.bind {
        Some(bind) => bind.clone(),
        None => format!("{}:{}", cfg.service.http.bind, cfg.service.http.port),
    };

    let state = AppState::new(cfg);
    let router = create_router(state);

    info!("HTTP server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, router).await?;

    Ok(())
}
