//! Shared server state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use authtunnel_browser::driver::USER_AGENT;
use authtunnel_browser::{Driver, LaunchOptions};
use authtunnel_core::config::{AccessToken, ServerConfig};

/// State shared by all connections and handlers. Everything here is scoped
/// to one server instance; nothing is process-global.
pub struct ServerState {
    pub config: Arc<ServerConfig>,
    pub access_token: AccessToken,
    pub driver: Arc<dyn Driver>,
    /// Launch options resolved once at startup; identical for every
    /// connection.
    launch: LaunchOptions,
    pub connections: RwLock<HashMap<String, ConnectionInfo>>,
}

/// Registry entry for one live operator connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub conn_id: String,
    pub connected_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(config: ServerConfig, access_token: AccessToken, driver: Arc<dyn Driver>) -> Self {
        let launch = LaunchOptions {
            executable: config.executable(),
            headless: true,
            proxy: config.resolve_upstream_proxy(),
            viewport: (config.viewport.width, config.viewport.height),
            user_agent: USER_AGENT.to_string(),
        };
        Self {
            config: Arc::new(config),
            access_token,
            driver,
            launch,
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub fn launch_options(&self) -> LaunchOptions {
        self.launch.clone()
    }

    pub async fn register(&self, conn_id: &str) {
        let mut connections = self.connections.write().await;
        connections.insert(
            conn_id.to_string(),
            ConnectionInfo {
                conn_id: conn_id.to_string(),
                connected_at: Utc::now(),
            },
        );
    }

    pub async fn unregister(&self, conn_id: &str) {
        let mut connections = self.connections.write().await;
        connections.remove(conn_id);
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}
