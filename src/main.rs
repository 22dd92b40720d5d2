use std::sync::Arc;

use anyhow::Context;
use rust_points_market::{
    adapters::{
        blob_store::local::LocalBlobStore, database::memory::MemoryDatabase,
        identity::jwt::JwtIdentity,
    },
    api::{self, AppState},
    commands::DomainLogic,
    config::Config,
    observability,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config = Config::from_env()?;

    let database = Arc::new(MemoryDatabase::default());
    let blob_store = Arc::new(LocalBlobStore::new(
        config.blob_root.clone(),
        config.blob_base_url.clone(),
    ));
    let state = AppState {
        logic: DomainLogic::new(database, blob_store, config.settings()),
        identity: Arc::new(JwtIdentity::new(config.jwt_secret.as_bytes())),
    };
    // Product image URLs default to this server's `/static` prefix
    let app = api::with_static_files(api::router(state), &config.blob_root);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}
