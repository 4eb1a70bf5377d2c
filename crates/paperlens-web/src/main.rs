use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

mod handlers;
mod models;
mod state;

use state::AppState;

/// Stream single-paper summaries over server-sent events
#[derive(Parser, Debug)]
#[command(name = "paperlens-web", version, about, long_about = None)]
struct ServerArgs {
    /// Address to bind
    #[arg(long, env = "REALTIME_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(long, env = "REALTIME_PORT", default_value_t = 8788)]
    port: u16,

    /// `*` or a comma-separated list of allowed CORS origins
    #[arg(long, env = "REALTIME_ALLOWED_ORIGINS", default_value = "*")]
    allowed_origins: String,
}

/// `*` allows any origin; otherwise a comma-separated list.
fn cors(allowed_origins: &str) -> CorsLayer {
    let origin = if allowed_origins.trim() == "*" {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .filter_map(|o| HeaderValue::from_str(o).ok())
            .collect();
        AllowOrigin::list(origins)
    };
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

fn app(state: Arc<AppState>, allowed_origins: &str) -> Router {
    Router::new()
        .route("/health", axum::routing::get(handlers::health::health))
        .route("/api/models", axum::routing::get(handlers::models::models))
        .route(
            "/api/summarize-one/stream",
            axum::routing::post(handlers::stream::stream),
        )
        .layer(cors(allowed_origins))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = ServerArgs::parse();

    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = paperlens_core::Config::default();
    config.apply_file(&paperlens_core::config_file::load_config());
    config.apply_env(|name| std::env::var(name).ok());
    tracing::debug!(config = ?config, "resolved config");

    let state = Arc::new(AppState::from_config(config)?);
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    tracing::info!(%addr, allowed_origins = %args.allowed_origins, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state, &args.allowed_origins)).await?;

    Ok(())
}
