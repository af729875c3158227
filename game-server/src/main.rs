use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

use game_core::sweep::SweepPolicy;
use game_core::words::WordBank;
use game_persistence::connection::connect_and_migrate;
use game_persistence::RoomStore;
use game_server::{config::Config, create_routes, engine::Engine, gateway::Gateway};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    info!("Starting draw-and-guess game server...");

    let config = Config::new();

    // Binding the store is the only fatal startup condition.
    let db = match connect_and_migrate(&config.database_url).await {
        Ok(db) => db,
        Err(err) => {
            tracing::error!("Failed to connect to database and run migrations: {}", err);
            std::process::exit(1);
        }
    };
    let store = Arc::new(RoomStore::new(db));
    let gateway = Arc::new(Gateway::new());
    let engine = Arc::new(Engine::new(
        store.clone(),
        gateway.clone(),
        WordBank::embedded(),
    ));

    let routes = create_routes(
        gateway.clone(),
        engine.clone(),
        store.clone(),
        config.allowed_origins.clone(),
    );

    // Idle-room sweeper
    {
        let store = store.clone();
        let engine = engine.clone();
        let interval_secs = config.room_sweep_interval_secs;
        tokio::spawn(async move {
            let policy = SweepPolicy::default();
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                interval.tick().await;
                let rooms = match store.list().await {
                    Ok(rooms) => rooms,
                    Err(err) => {
                        warn!("Room sweep skipped, store unavailable: {}", err);
                        continue;
                    }
                };
                let now = chrono::Utc::now();
                for (room, _) in rooms {
                    if policy.should_delete(&room, now) {
                        info!("Sweeping idle room {}", room.room_id);
                        engine.delete_room(&room.room_id).await;
                    }
                }
            }
        });
    }

    // Rate-limit bucket sweeper
    {
        let gateway = gateway.clone();
        let interval_secs = config.bucket_sweep_interval_secs;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                interval.tick().await;
                gateway.rate_limits.sweep_idle();
            }
        });
    }

    info!("Server starting on {}:{}", config.host, config.port);

    let addr = (
        config.host.parse::<std::net::IpAddr>().expect("Invalid HOST"),
        config.port,
    );

    let (addr, server) = warp::serve(routes).bind_with_graceful_shutdown(addr, async {
        // Wait for SIGINT (Ctrl+C) or SIGTERM
        #[cfg(unix)]
        {
            let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt()).unwrap();
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate()).unwrap();

            tokio::select! {
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully...");
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            signal::ctrl_c().await.expect("Failed to listen for ctrl+c");
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    });

    info!(
        "Server started successfully on {}. Press Ctrl+C to stop.",
        addr
    );
    server.await;
    info!("Server shutdown complete.");
}
