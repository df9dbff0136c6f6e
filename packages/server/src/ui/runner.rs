//! Server startup and shutdown.

use std::sync::Arc;

use crate::{
    config::Config,
    domain::SessionRepository,
    error::ServerError,
    infrastructure::repository::InMemorySessionRepository,
    usecase::{CredentialSource, RegistryDeps, SessionRegistry},
};

use super::{router::build_router, signal::shutdown_signal, state::AppState};

/// Run the server until a shutdown signal arrives, then stop every session.
pub async fn run(config: Config) -> Result<(), ServerError> {
    let default_user_id = config.default_user_id()?;
    let repository: Arc<dyn SessionRepository> = Arc::new(InMemorySessionRepository::new());
    let registry = Arc::new(SessionRegistry::new(
        RegistryDeps {
            repository,
            gateway: config.gateway(),
            fetcher: config.credential_fetcher()?,
            store: Arc::new(config.credential_store()),
        },
        config.registry_settings()?,
    ));

    if let Some(session_id) = config.session_id.clone() {
        match registry
            .start(default_user_id.clone(), CredentialSource::SessionId(session_id))
            .await
        {
            Ok(_) => tracing::info!("Boot session started for '{}'", default_user_id),
            Err(e) => tracing::error!("Boot session for '{}' failed: {}", default_user_id, e),
        }
    }

    let state = Arc::new(AppState::new(registry.clone(), default_user_id));
    let app = build_router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    tracing::info!("Session host listening on {}", addr);
    tracing::info!("Sessions root: {}", config.session_dir.display());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    registry.shutdown().await;
    tracing::info!("Server stopped");
    Ok(())
}
