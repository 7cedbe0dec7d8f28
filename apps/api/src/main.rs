mod access;
mod admin;
mod auth;
mod config;
mod db;
mod errors;
mod listings;
mod models;
mod profile;
mod routes;
mod session;
mod state;
mod storage;
mod subscription;
#[cfg(test)]
mod testing;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::auth::gotrue::GoTrueClient;
use crate::config::Config;
use crate::db::{create_pool, run_migrations};
use crate::listings::PgListingRepository;
use crate::profile::{PgProfileRepository, ProfileSynchronizer};
use crate::routes::build_router;
use crate::session::SessionHub;
use crate::state::AppState;
use crate::storage::S3MediaStore;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Swap N Stay API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    if config.run_migrations {
        run_migrations(&db).await?;
    }

    // Initialize object storage
    let s3 = build_s3_client(&config).await;
    let media = Arc::new(S3MediaStore::new(
        s3,
        config.s3_bucket.clone(),
        &config.s3_public_url,
    ));
    info!("S3 client initialized (bucket: {})", config.s3_bucket);

    // Initialize auth collaborator
    let auth = Arc::new(GoTrueClient::new(
        &config.baas_url,
        config.baas_anon_key.clone(),
    )?);
    info!("Auth client initialized ({})", config.baas_url);

    let profiles = Arc::new(PgProfileRepository::new(db.clone()));
    let sessions = Arc::new(SessionHub::new(
        auth.clone(),
        ProfileSynchronizer::new(profiles.clone()),
        config.sessions,
    ));
    SessionHub::spawn_sweeper(&sessions, config.sessions.revalidate);
    info!("Session timings: {:?}", config.sessions);
    info!("Quotas: {:?}", config.quotas);

    // Build app state
    let state = AppState {
        auth,
        profiles,
        listings: Arc::new(PgListingRepository::new(db)),
        media,
        sessions,
        quotas: config.quotas,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client for the backend's S3-compatible storage endpoint.
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "swapnstay-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new(config.s3_region.clone()))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&s3_config)
        .force_path_style(true)
        .build();

    aws_sdk_s3::Client::from_conf(s3_config)
}
