/**
 * MAPP KERNEL - Point d'entrée du serveur de carte d'occupation des labos
 *
 * RÔLE : Orchestration des modules : config, store, annuaire, HTTP.
 * Bootstrap du système complet avec gestion d'erreurs et logging.
 *
 * ARCHITECTURE : API REST (lecture de la carte + ingestion) au-dessus d'un
 * State Store injecté (mémoire ou Redis) et d'un annuaire.
 */

mod config;
mod demo;
mod directory;
mod error;
mod friends;
mod grid;
mod http;
mod ingest;
mod lab;
mod models;
mod queries;
mod state;
mod store;
mod viewer;

use crate::config::{load_config, KernelConfig, StoreConf};
use crate::directory::StaticDirectory;
use crate::lab::Lab;
use crate::state::AppState;
use crate::store::{keys, MemoryStore, StateStore, WriteBatch};

use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg: KernelConfig = load_config().await;

    let store = open_store(&cfg.store)?;
    tracing::info!(backend = store.backend_name(), "[kernel] state store ready");

    let lab = Lab::new(store, cfg.primary_site.clone());
    seed_authorised_keys(&lab, &cfg.authorised_keys).context("failed to seed callback keys")?;

    let directory = Arc::new(StaticDirectory::new(cfg.directory.people.clone()));

    // fabrique l'état unique pour Axum
    let listen = cfg.listen.clone();
    let app_state = AppState {
        lab,
        directory,
        cfg: Arc::new(cfg),
    };

    let app = http::build_router(app_state);

    let listener = TcpListener::bind(&listen)
        .await
        .with_context(|| format!("cannot bind {listen}"))?;
    tracing::info!("[kernel] listening on http://{listen}");
    axum::serve(listener, app).await.context("http server failed")?;
    Ok(())
}

fn open_store(conf: &StoreConf) -> anyhow::Result<Arc<dyn StateStore>> {
    match conf {
        StoreConf::Memory { snapshot: None } => Ok(Arc::new(MemoryStore::new())),
        StoreConf::Memory { snapshot: Some(path) } => {
            let store = MemoryStore::with_snapshot(path)
                .with_context(|| format!("cannot load snapshot {path}"))?;
            Ok(Arc::new(store))
        }
        #[cfg(feature = "redis-backend")]
        StoreConf::Redis { url } => {
            let store = crate::store::redis_store::RedisStore::connect(url)
                .with_context(|| format!("cannot connect to {url}"))?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redis-backend"))]
        StoreConf::Redis { .. } => {
            anyhow::bail!("redis store requested but the kernel was built without the `redis-backend` feature")
        }
    }
}

/// Ajoute à `authorised-key` les clés de la config qui n'y sont pas encore
fn seed_authorised_keys(lab: &Lab, configured: &[String]) -> anyhow::Result<()> {
    let existing = lab.store().lrange(keys::AUTHORISED_KEYS)?;
    let missing: Vec<String> = configured
        .iter()
        .filter(|k| !k.is_empty() && !existing.contains(k))
        .cloned()
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    let mut batch = WriteBatch::new();
    batch.rpush(keys::AUTHORISED_KEYS, missing.clone());
    lab.store().apply(&batch)?;
    tracing::info!(added = missing.len(), "[kernel] callback keys seeded");
    Ok(())
}
