use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::ConfigManager;
use crate::gitlab::api_client::GitLabApiClient;
use crate::infrastructure::error::ReporterError;
use crate::models::Connection;

/// Holds the authoritative in-process list of configured connections, backed
/// by persisted configuration.
///
/// Mutations happen on configuration-apply paths; fetch tasks read concurrent
/// snapshots (the list is cloned on read, so readers never observe a partial
/// update). Identity resolution for connections missing it runs in background
/// tasks started by an explicit, idempotent `initialize()`.
pub struct InstanceRegistry {
    config: Arc<ConfigManager>,
    api_client: Arc<GitLabApiClient>,
    connections: RwLock<Vec<Connection>>,
    initialized: AtomicBool,
}

impl InstanceRegistry {
    pub fn new(config: Arc<ConfigManager>, api_client: Arc<GitLabApiClient>) -> Self {
        let mut connections = config.connections();
        ensure_active(&mut connections);
        Self {
            config,
            api_client,
            connections: RwLock::new(connections),
            initialized: AtomicBool::new(false),
        }
    }

    /// Resolve missing identities in the background.
    ///
    /// Idempotent: only the first call spawns work. The returned handle
    /// completes when every pending identity fetch has finished; callers that
    /// do not care simply drop it.
    pub fn initialize(self: &Arc<Self>) -> JoinHandle<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return tokio::spawn(async {});
        }

        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let pending: Vec<Connection> = registry
                .connections()
                .await
                .into_iter()
                .filter(|c| c.is_valid() && !c.has_resolved_identity())
                .collect();

            if pending.is_empty() {
                return;
            }
            info!(count = pending.len(), "Resolving missing connection identities");

            for connection in pending {
                if let Err(e) = registry.resolve_identity(&connection.id).await {
                    warn!(connection = %connection.name, "Identity resolution failed: {}", e);
                }
            }
        })
    }

    // ==================== Connection Management ====================

    /// Snapshot of all configured connections.
    pub async fn connections(&self) -> Vec<Connection> {
        self.connections.read().await.clone()
    }

    pub async fn get(&self, connection_id: &str) -> Option<Connection> {
        self.connections
            .read()
            .await
            .iter()
            .find(|c| c.id == connection_id)
            .cloned()
    }

    /// The currently active connection, if any.
    pub async fn active(&self) -> Option<Connection> {
        self.connections
            .read()
            .await
            .iter()
            .find(|c| c.is_active)
            .cloned()
    }

    /// Flip exactly one connection to active, all others to inactive.
    pub async fn set_active(&self, connection_id: &str) -> Result<(), ReporterError> {
        {
            let mut connections = self.connections.write().await;
            for connection in connections.iter_mut() {
                connection.is_active = connection.id == connection_id;
            }
        }
        self.persist().await
    }

    /// Add a new connection.
    ///
    /// An empty id gets a generated UUID. Invalid or duplicate-id connections
    /// are rejected. The first connection added becomes active.
    pub async fn add(&self, mut connection: Connection) -> Result<Connection, ReporterError> {
        if connection.id.is_empty() {
            connection.id = Uuid::new_v4().to_string();
        }
        if !connection.is_valid() {
            return Err(ReporterError::validation(
                "Connection is missing required fields",
                None,
            ));
        }

        {
            let mut connections = self.connections.write().await;
            if connections.iter().any(|c| c.id == connection.id) {
                return Err(ReporterError::validation(
                    format!("Duplicate connection id: {}", connection.id),
                    Some("id".into()),
                ));
            }
            connection.is_active = connections.is_empty();
            connections.push(connection.clone());
        }

        self.persist().await?;
        Ok(connection)
    }

    /// Add a connection and resolve its identity right away.
    pub async fn add_and_resolve_identity(
        &self,
        connection: Connection,
    ) -> Result<Connection, ReporterError> {
        let added = self.add(connection).await?;
        self.resolve_identity(&added.id).await?;
        self.get(&added.id)
            .await
            .ok_or_else(|| ReporterError::validation("Connection vanished after add", None))
    }

    /// Replace an existing connection. Returns false when the id is unknown.
    pub async fn update(&self, connection: Connection) -> Result<bool, ReporterError> {
        let updated = {
            let mut connections = self.connections.write().await;
            match connections.iter_mut().find(|c| c.id == connection.id) {
                Some(slot) => {
                    *slot = connection;
                    true
                }
                None => false,
            }
        };

        if updated {
            self.persist().await?;
        }
        Ok(updated)
    }

    /// Remove a connection. If the removed one was active and others remain,
    /// the first remaining connection becomes active.
    pub async fn remove(&self, connection_id: &str) -> Result<bool, ReporterError> {
        let removed = {
            let mut connections = self.connections.write().await;
            let before = connections.len();
            connections.retain(|c| c.id != connection_id);
            let removed = connections.len() != before;
            if removed {
                ensure_active(&mut connections);
            }
            removed
        };

        if removed {
            self.persist().await?;
        }
        Ok(removed)
    }

    // ==================== Identity ====================

    /// Test connectivity and store the resolved identity on success.
    pub async fn test_connection(&self, connection_id: &str) -> Result<bool, ReporterError> {
        match self.resolve_identity(connection_id).await {
            Ok(()) => Ok(true),
            Err(ReporterError::Network { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Fetch `/user` for a connection and persist username/display name/email.
    pub async fn resolve_identity(&self, connection_id: &str) -> Result<(), ReporterError> {
        let connection = self.get(connection_id).await.ok_or_else(|| {
            ReporterError::validation(format!("Unknown connection: {}", connection_id), None)
        })?;

        let user = self.api_client.current_user(&connection).await?;
        let Some(user) = user else {
            error!(connection = %connection.name, "Identity resolution returned no user");
            return Err(ReporterError::network(
                format!("Could not resolve identity for {}", connection.name),
                None,
            ));
        };

        {
            let mut connections = self.connections.write().await;
            if let Some(slot) = connections.iter_mut().find(|c| c.id == connection_id) {
                slot.user_name = Some(user.username.clone());
                slot.user_display_name = Some(user.name.clone());
                slot.user_email = user.email.clone();
            }
        }
        info!(
            connection = %connection.name,
            username = %user.username,
            "Resolved connection identity"
        );
        self.persist().await
    }

    async fn persist(&self) -> Result<(), ReporterError> {
        let snapshot = self.connections.read().await.clone();
        self.config.set_connections(snapshot)
    }
}

/// If nothing is active but connections exist, designate the first.
fn ensure_active(connections: &mut [Connection]) {
    if !connections.is_empty() && !connections.iter().any(|c| c.is_active) {
        connections[0].is_active = true;
    }
}
