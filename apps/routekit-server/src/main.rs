use anyhow::{Context, Result};
use axum::{routing::get, Router};
use clap::{Parser, Subcommand};
use routekit::{resolve, RouteTable};
use runtime::{AppConfig, CliArgs};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
};

mod demo;
mod request_id;

/// Routekit Server - declarative route factories with validated requests
#[derive(Parser)]
#[command(name = "routekit-server")]
#[command(about = "Routekit Server - declarative route factories with validated requests")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port for HTTP server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print current configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Run,
    /// Check configuration and resolve the route tree without serving
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        port: cli.port,
        print_config: cli.print_config,
        verbose: cli.verbose,
    };

    // Load configuration (normalized home_dir is applied inside)
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    let logging_config = config.logging.clone().unwrap_or_default();
    runtime::init_logging_from_config(&logging_config, Path::new(&config.server.home_dir));

    if args.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_server(config).await,
        Commands::Check => check_config(config).await,
    }
}

/// Resolve the factory tree into a route table.
async fn build_table(config: &AppConfig) -> Result<RouteTable> {
    let schemas_dir = config.schemas_dir();
    let root = demo::ApiRoot::new(&schemas_dir)
        .with_context(|| format!("Failed to load schemas from '{}'", schemas_dir.display()))?;
    let table = resolve(root)
        .await
        .context("Failed to resolve route factories")?;
    Ok(table.with_body_limit(config.server.body_limit_bytes))
}

async fn health() -> &'static str {
    "ok"
}

fn build_router(table: RouteTable, config: &AppConfig) -> Router {
    let mut router = table.register(Router::new().route("/health", get(health)));

    // Layers are added innermost first; outermost to innermost:
    // SetRequestId -> PropagateRequestId -> Trace -> Timeout -> BodyLimit -> routes
    router = router.layer(RequestBodyLimitLayer::new(config.server.body_limit_bytes));

    if config.server.timeout_sec > 0 {
        router = router.layer(TimeoutLayer::new(Duration::from_secs(
            config.server.timeout_sec,
        )));
    }

    let x_request_id = request_id::header();
    router
        .layer(request_id::create_trace_layer())
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(SetRequestIdLayer::new(x_request_id, request_id::MakeReqId))
}

async fn run_server(config: AppConfig) -> Result<()> {
    tracing::info!("Routekit Server starting");

    let table = build_table(&config).await?;
    let routes = table.len();
    let router = build_router(table, &config);

    let host = config.server.host.as_str();
    let port = config.server.port;
    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind to address {host}:{port}"))?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, routes, "HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    tracing::info!("Routekit Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

async fn check_config(config: AppConfig) -> Result<()> {
    tracing::info!("Checking configuration...");

    let table = build_table(&config).await?;

    println!("Configuration is valid");
    println!("Routes ({}):", table.len());
    for route in &table {
        println!("  {:<14} {}", route.methods().to_string(), route.path());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn config_in(dir: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.server.home_dir = dir.to_string_lossy().to_string();
        config
    }

    #[tokio::test]
    async fn router_serves_health_and_api_with_request_ids() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let router = build_router(build_table(&config).await.unwrap(), &config);

        let resp = router
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().contains_key("x-request-id"));

        let resp = router
            .oneshot(
                Request::get("/api/db/status")
                    .header("x-request-id", "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["x-request-id"], "abc-123");
    }

    #[tokio::test]
    async fn oversized_bodies_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.server.body_limit_bytes = 16;
        let router = build_router(build_table(&config).await.unwrap(), &config);

        let body = r#"{"title":"a fairly long title"}"#;
        let resp = router
            .oneshot(
                Request::post("/api/notes")
                    .header("content-type", "application/json")
                    .header("content-length", body.len())
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
