use murmur_api::{
    config::{ConfigError, Env},
    server::{self, ServerState},
};
use murmur_common::model::user::PasswordHasher;
use murmur_db::{
    client::DbClient,
    memory::MemoryStore,
    store::{DbError, FeedStore},
};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Error)]
enum InitError {
    #[error("Error reading configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Error setting up database: {0}")]
    Database(#[from] DbError),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "murmur_api=debug,murmur_common=debug,murmur_db=debug,\
                tower_http=debug,axum::rejection=trace,sqlx=warn"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Cancels `shutdown` on ctrl-c or SIGTERM.
async fn cancel_on_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Could not listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutting down");
    shutdown.cancel();
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let env = Env::load()?;
    debug!(?env, "Loaded configuration");

    let worker_id = env.worker_id()?;
    let process_id = env.process_id()?;

    let (store, db): (Arc<dyn FeedStore>, Option<Arc<DbClient>>) = match &env.database_url {
        Some(url) => {
            let db = DbClient::connect(
                url,
                env.database_max_connections,
                env.request_timeout(),
                worker_id,
                process_id,
            )
            .await?;
            db.migrate().await?;
            info!("Connected to PostgreSQL");

            let db = Arc::new(db);
            (Arc::clone(&db) as Arc<dyn FeedStore>, Some(db))
        }
        None => {
            warn!("DATABASE_URL not set, keeping all data in memory");
            (Arc::new(MemoryStore::new(worker_id, process_id)), None)
        }
    };

    let state = ServerState::new(store, env.token_signer()?, PasswordHasher::default());
    let app = server::app(state, env.request_timeout(), env.cors_layer()?);

    let server_address = env.socket_address();
    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(%server_address, "Listening");

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(InitError::TcpServe)?;

    if let Some(db) = db {
        db.close().await;
    }

    Ok(())
}
