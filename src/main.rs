//! Auth gateway binary: configuration, store assembly, serving.

use auth_gateway::config::{Config, LogFormat};
use auth_gateway::entities::EntityStore;
use auth_gateway::http;
use auth_gateway::jwt::TokenSigner;
use auth_gateway::keys::{KeyManager, KeyStore, MemoryKeyStore, RedisKeyStore};
use auth_gateway::loaders::FileLoader;
use auth_gateway::providers::{MockEngine, ProviderHost};
use auth_gateway::sessions::{MemorySessionStore, RedisSessionStore, SessionStore};
use auth_gateway::shutdown::ShutdownCoordinator;
use auth_gateway::state::AppState;
use auth_gateway::templates::HtmlTemplates;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config);

    info!(
        environment = ?config.environment,
        port = config.port,
        "Starting auth gateway"
    );

    let entities = Arc::new(EntityStore::new());
    let mut coordinator = ShutdownCoordinator::new();

    // Initial entity load blocks readiness; watching runs for the process
    // lifetime.
    if let Some(resource_dir) = config.resource_dir.clone() {
        let mut loader = FileLoader::new(entities.clone(), resource_dir);
        loader.load_initial()?;
        coordinator.spawn("file-loader", loader.watch(coordinator.subscribe()));
    } else {
        warn!("RESOURCE_DIR not set, starting without tenants");
    }

    let sessions: Arc<dyn SessionStore> = match config.redis_url() {
        Some(url) => {
            info!("Using Redis session store");
            Arc::new(RedisSessionStore::new(&url).await?)
        }
        None => {
            let store = Arc::new(MemorySessionStore::new());
            coordinator.spawn(
                "session-sweeper",
                store.clone().run_sweeper(coordinator.subscribe()),
            );
            store
        }
    };

    let key_store: Arc<dyn KeyStore> = match config.redis_url() {
        Some(url) => Arc::new(RedisKeyStore::new(&url).await?),
        None => Arc::new(MemoryKeyStore::new()),
    };
    let keys = Arc::new(KeyManager::new(key_store));
    keys.ensure_active().await?;

    let signer = Arc::new(TokenSigner::new(
        keys.clone(),
        config.jwt_secret.clone(),
        config.default_algorithm,
    ));

    // Script engine assembly point; the built-in engine only covers
    // development.
    if config.environment.is_production() {
        warn!("No script engine configured, provider decisions use the built-in mock");
    }
    let providers = Arc::new(ProviderHost::new(
        Arc::new(MockEngine::permissive()),
        config.script_timeout,
    ));

    let templates = Arc::new(HtmlTemplates::new());

    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState {
        config,
        entities,
        sessions,
        keys,
        signer,
        providers,
        templates,
    });

    let app = http::router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Auth gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to listen for ctrl+c");
            info!("Shutdown signal received");
        })
        .await?;

    coordinator.shutdown(Duration::from_secs(10)).await;
    info!("Auth gateway shutdown complete");
    Ok(())
}

fn init_tracing(config: &Config) {
    let level = match config.log_level.as_str() {
        "warning" => "warn",
        other => other,
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    match config.log_format {
        LogFormat::Ndjson => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        LogFormat::Console => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}
