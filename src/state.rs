//! Shared application state.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use tracing::info;

use crate::config::ServerConfig;
use crate::core::conversation::SessionRegistry;
use crate::core::provider::{BaseProvider, ProviderResult, create_provider};

/// Why a new WebSocket connection was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionLimitError {
    /// The global connection cap is reached
    GlobalLimitReached,
    /// This IP already holds its maximum number of connections
    PerIpLimitReached,
}

/// Application state shared across all handlers and middleware.
pub struct AppState {
    pub config: ServerConfig,
    /// The configured generative-response provider, shared by all sessions
    pub provider: Arc<dyn BaseProvider>,
    /// Connection-to-session map
    pub sessions: SessionRegistry,

    // Connection tracking for limit enforcement
    ws_connections: AtomicUsize,
    ip_connections: RwLock<HashMap<IpAddr, usize>>,
}

impl AppState {
    /// Build application state, creating the configured provider.
    pub async fn new(config: ServerConfig) -> ProviderResult<Arc<Self>> {
        let provider = create_provider(&config.provider, config.provider_config())?;
        info!(provider = provider.name(), "Provider initialized");

        Ok(Arc::new(Self {
            config,
            provider,
            sessions: SessionRegistry::new(),
            ws_connections: AtomicUsize::new(0),
            ip_connections: RwLock::new(HashMap::new()),
        }))
    }

    /// Reserve a connection slot for `ip`, enforcing the global cap first
    /// and the per-IP cap second. The check-and-increment runs under one
    /// lock so concurrent upgrades cannot oversubscribe a limit.
    pub fn try_acquire_connection(&self, ip: IpAddr) -> Result<(), ConnectionLimitError> {
        let mut per_ip = self.ip_connections.write();

        let global = self.ws_connections.load(Ordering::Acquire);
        if let Some(max) = self.config.max_websocket_connections {
            if global >= max {
                return Err(ConnectionLimitError::GlobalLimitReached);
            }
        }

        let count = per_ip.entry(ip).or_insert(0);
        if *count >= self.config.max_connections_per_ip {
            return Err(ConnectionLimitError::PerIpLimitReached);
        }

        *count += 1;
        self.ws_connections.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Release a slot previously acquired for `ip`.
    pub fn release_connection(&self, ip: IpAddr) {
        let mut per_ip = self.ip_connections.write();
        if let Some(count) = per_ip.get_mut(&ip) {
            *count -= 1;
            if *count == 0 {
                per_ip.remove(&ip);
            }
            self.ws_connections.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Current number of open WebSocket connections.
    pub fn ws_connection_count(&self) -> usize {
        self.ws_connections.load(Ordering::Acquire)
    }

    /// Current number of open connections for one IP.
    pub fn ip_connection_count(&self, ip: &IpAddr) -> usize {
        self.ip_connections.read().get(ip).copied().unwrap_or(0)
    }
}
