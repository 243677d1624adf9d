//! JSON-lines bridge binary: calls on stdin, responses and stream events on
//! stdout, logs on stderr.

use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vproc_media::check_ffmpeg;
use vproc_service::bridge::OUTPUT_BUFFER_SIZE;
use vproc_service::{Bridge, ServiceConfig, VideoService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production. Stdout belongs to the bridge.
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("vproc=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting vproc-bridge");

    let config = ServiceConfig::from_env();
    info!("Service config: {:?}", config);

    match check_ffmpeg() {
        Ok(path) => info!("Using ffmpeg at {}", path.display()),
        Err(e) => warn!("{}; engine calls will fail", e),
    }

    let service = Arc::new(VideoService::from_config(config));
    let (tx, mut rx) = mpsc::channel::<serde_json::Value>(OUTPUT_BUFFER_SIZE);

    let send_task = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(message) = rx.recv().await {
            let mut line = message.to_string();
            line.push('\n');
            if let Err(e) = stdout.write_all(line.as_bytes()).await {
                error!("Failed to write bridge output: {}", e);
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    let bridge = Bridge::new(service, tx);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let bridge = bridge.clone();
                    tokio::spawn(async move { bridge.handle_line(&line).await });
                }
                Ok(None) => {
                    info!("Input closed");
                    break;
                }
                Err(e) => {
                    error!("Failed to read bridge input: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    // Pending calls keep their sender clones until they respond
    bridge.shutdown();
    drop(bridge);
    let _ = send_task.await;

    info!("vproc-bridge stopped");
    Ok(())
}
