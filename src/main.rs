//! tiered-config-cache host server.

use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use tiered_config_cache::api::client::SdkClient;
use tiered_config_cache::api::transport::{HttpTransport, Transport};
use tiered_config_cache::cache::entry::Tier;
use tiered_config_cache::cache::store::{new_shared_store, TieredStore};
use tiered_config_cache::config::{Cli, Config};
use tiered_config_cache::overlay::UpdateHub;
use tiered_config_cache::server::host_api::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "tiered_config_cache=debug,tower_http=debug"
    } else {
        "tiered_config_cache=info,tower_http=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .init();

    info!("tiered-config-cache v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let mut config = Config::load(&cli.config)?;
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }

    info!(
        backend = %config.backend.base_url,
        namespace = %config.storage.namespace,
        session_dir = %config.storage.session_dir.display(),
        persistent_dir = %config.storage.persistent_dir.display(),
        "Configuration loaded"
    );

    // Open the store.
    let keys = config.keys.to_table();
    for tier in Tier::ALL {
        let assigned: Vec<&str> = keys.keys_in(tier).collect();
        info!(tier = %tier, keys = ?assigned, "Tier assignment");
    }
    let store = new_shared_store(TieredStore::open(&config.storage, keys)?);

    // Backend client and update hub.
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&config.backend)?);
    let client = SdkClient::new(transport, store.clone());
    let hub = UpdateHub::new(store.clone(), config.server.update_channel_capacity);

    if config.server.warm_up {
        let client = client.clone();
        tokio::spawn(async move {
            client.warm_up().await;
        });
    }

    let state = Arc::new(AppState {
        client,
        hub: hub.clone(),
        store: store.clone(),
        start_time: Instant::now(),
    });

    let app = build_router(state);

    // Start the server.
    let listen_addr = config.server.listen.clone();
    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
            }
            // Open SSE listeners would otherwise keep the server alive.
            hub.close();
        })
        .await?;

    // The session ends with the process.
    store.lock().await.end_session()?;
    info!("Shut down");

    Ok(())
}
