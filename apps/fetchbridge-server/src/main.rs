//! fetchbridge server - serves a fetch-standard demo application over hyper.
//!
//! # Usage
//!
//! ```text
//! FETCHBRIDGE_LISTEN=0.0.0.0:3000 fetchbridge-server
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `FETCHBRIDGE_LISTEN` | `0.0.0.0:3000` | Bind address |
//! | `FETCHBRIDGE_MODE` / `APP_ENV` | `production` | Operating mode handed to the handler |
//! | `FETCHBRIDGE_TRUST_PROXY` | `false` | Trust `x-forwarded-proto` / `x-forwarded-host` |
//! | `FETCHBRIDGE_SCHEME` | `http` | Scheme reported for inbound requests |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

mod demo;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use fetchbridge_core::BridgeConfig;
use fetchbridge_http::{BridgeHttpService, ExchangeOptions, FetchAdapter, FetchHandler};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::demo::{DemoHandler, DemoInterceptor};

/// Version string the demo interceptor puts in `/health` replies.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the global subscriber.
///
/// A non-empty `RUST_LOG` takes precedence; otherwise `log_level` from the
/// bridge configuration is used as the filter directive.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(&directives)
            .with_context(|| format!("invalid RUST_LOG filter: {directives}"))?,
        _ => EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid LOG_LEVEL filter: {log_level}"))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
    Ok(())
}

/// Accept connections and hand each one to the bridge service.
///
/// Ctrl-C stops accepting; exchanges already in flight are allowed to finish
/// before this returns.
async fn serve<H: FetchHandler>(
    listener: TcpListener,
    service: BridgeHttpService<H>,
) -> Result<()> {
    let watcher = hyper_util::server::graceful::GracefulShutdown::new();
    let builder = HttpConnBuilder::new(TokioExecutor::new());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            },
            signal = &mut ctrl_c => {
                if let Err(e) = signal {
                    warn!(error = %e, "cannot listen for ctrl-c, stopping");
                }
                break;
            }
        };

        let conn = builder
            .serve_connection(TokioIo::new(stream), service.clone())
            .into_owned();
        let conn = watcher.watch(conn);
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                error!(%peer, error = %e, "bridge connection failed");
            }
        });
    }

    info!("stopped accepting, waiting for open exchanges");
    watcher.shutdown().await;
    info!("fetchbridge server stopped");
    Ok(())
}

/// Address `--health-check` connects to: wildcard binds map to loopback.
fn health_check_addr(listen: &str) -> String {
    listen.replace("0.0.0.0", "127.0.0.1")
}

/// Ask a running fetchbridge server for `/health`.
///
/// Succeeds only when the demo interceptor answers `200` and reports the
/// server as running.
async fn run_health_check(addr: &str) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let mut stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("fetchbridge server not reachable at {addr}"))?;
    let request = format!("GET /health HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;

    let mut reply = String::new();
    stream.read_to_string(&mut reply).await?;

    let ok_status = reply
        .lines()
        .next()
        .is_some_and(|status| status.split_whitespace().nth(1) == Some("200"));
    if ok_status && reply.contains("\"running\"") {
        Ok(())
    } else {
        anyhow::bail!("fetchbridge server at {addr} is not healthy")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = BridgeConfig::from_env();

    // Container health checks run the binary itself with --health-check.
    if std::env::args().any(|a| a == "--health-check") {
        let addr = health_check_addr(&config.listen);
        let healthy = run_health_check(&addr).await.is_ok();
        std::process::exit(i32::from(!healthy));
    }

    init_tracing(&config.log_level)?;
    config.validate()?;

    let adapter = FetchAdapter::builder(Arc::new(DemoHandler))
        .interceptor(DemoInterceptor)
        .mode(config.mode)
        .build();
    let service = BridgeHttpService::new(adapter, ExchangeOptions::from_config(&config));

    let addr: SocketAddr = config
        .listen
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.listen))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(
        %addr,
        mode = %config.mode,
        trust_proxy = config.trust_proxy,
        version = VERSION,
        "starting fetchbridge server",
    );

    serve(listener, service).await
}
