//! Application entry point for the `ecoguardian` service.
//!
//! This binary orchestrates the full startup sequence:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Choosing a store backend (PostgreSQL pool, or in-memory when no
//!   `DATABASE_URL` is set) and creating the schema if it does not exist
//! - Wiring notification channels into the alert dispatcher
//! - Mounting all API routes via the `routes` gateway (EMBP pattern)
//! - Binding the Axum HTTP server and serving requests
//!
//! # Environment Variables
//! - `DATABASE_URL` (optional) – PostgreSQL connection string
//! - `DB_POOL_MAX` (optional) – maximum number of DB connections (default: 5)
//! - `ECOGUARDIAN_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `ECOGUARDIAN_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! See `config.rs` for the remaining settings.
use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Result;
use axum::Router;
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use ecoguardian::channels::WebhookChannel;
use ecoguardian::engine::{AlertDispatcher, Engine};
use ecoguardian::models::Channel;
use ecoguardian::routes::{self, AppState};
use ecoguardian::store::{MemoryStore, PgStore, Stores};
use ecoguardian::{config, schema, Config};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    init_tracing();
    dotenv().ok();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let stores = build_stores(&cfg).await?;
    let engine = Engine::new(stores, build_dispatcher(&cfg));

    // Seed the configuration singleton so the first reading does not race it.
    engine.config().await?;

    // Build app from routes gateway (EMBP)
    let app: Router = routes::router(AppState {
        engine: Arc::new(engine),
        insights_window_hours: cfg.insights_window_hours,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.listen_port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ---

async fn build_stores(cfg: &Config) -> Result<Stores> {
    // ---
    let Some(db_url) = cfg.db_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set, using in-memory stores (data is lost on exit)");
        return Ok(Stores::from_backend(Arc::new(MemoryStore::new())));
    };

    tracing::info!("Attempting to connect to database");

    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_pool_max)
        .connect(db_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

    tracing::info!("Successfully connected to database");

    schema::create_schema(&pool).await?;

    Ok(Stores::from_backend(Arc::new(PgStore::new(pool))))
}

fn build_dispatcher(cfg: &Config) -> AlertDispatcher {
    // ---
    let mut dispatcher = AlertDispatcher::new(cfg.screen_target.clone(), cfg.channel_timeout);

    let webhooks = [
        (Channel::Sms, &cfg.sms_webhook_url),
        (Channel::Email, &cfg.email_webhook_url),
        (Channel::Screen, &cfg.screen_webhook_url),
    ];
    for (channel, url) in webhooks {
        if let Some(url) = url {
            tracing::info!("{} notifications via webhook {}", channel, url);
            dispatcher = dispatcher.with_sender(channel, Arc::new(WebhookChannel::new(channel, url)));
        }
    }

    dispatcher
}

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `ECOGUARDIAN_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by `RUST_LOG`, falling back to `ECOGUARDIAN_LOG_LEVEL`
///
/// This should be called once at application startup before any logging
/// or tracing macros are invoked.
fn init_tracing() {
    // ---
    let span_events = match env::var("ECOGUARDIAN_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("ECOGUARDIAN_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn,hyper=info,reqwest=info"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
