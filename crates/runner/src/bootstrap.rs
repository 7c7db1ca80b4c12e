//! Bootstrap - wiring from configuration to running connections
//!
//! Handles startup of the client:
//! - Building the handler registry
//! - Creating one connection per configured identity
//! - Distributing the configured keywords

use log::{debug, info, warn};
use std::sync::Arc;
use userstream_core::{
    DeleteNotification, DisconnectNotification, LimitNotification, NotificationKind,
    StatusNotification,
};
use userstream_gateway::{DispatchError, HandlerRegistry};
use userstream_ports::RequestProducer;

use crate::config::{ConfigError, UserStreamConfigFile};
use crate::error::BootstrapError;
use crate::manager::{KeywordManager, KeywordReport};

/// Registry whose callbacks log every notification family
pub fn logging_registry() -> Result<HandlerRegistry, DispatchError> {
    let registry = HandlerRegistry::new();

    registry.on::<StatusNotification>(|n| {
        info!("@{}: {}", n.status.user.screen_name, n.status.text);
    })?;
    registry.on::<DeleteNotification>(|n| {
        debug!("{:?} {} deleted by {}", n.target, n.id, n.user_id);
    })?;
    registry.on::<LimitNotification>(|n| {
        warn!("{} statuses not delivered", n.undelivered_count);
    })?;
    registry.on::<DisconnectNotification>(|n| {
        warn!("Server disconnect {} on {}: {}", n.code, n.stream_name, n.reason);
    })?;
    registry.register(NotificationKind::Warning, |n| {
        if let Some(w) = n.as_warning() {
            warn!("Stream warning {}: {}", w.code, w.message);
        }
    })?;
    registry.register(NotificationKind::Event, |n| {
        if let Some(e) = n.as_event() {
            info!(
                "Event {}: @{} -> @{}",
                e.event_name, e.source.screen_name, e.target.screen_name
            );
        }
    })?;
    registry.register(NotificationKind::Any, |n| {
        debug!("{} at {}", n.kind(), n.timestamp());
    })?;

    Ok(registry)
}

/// A configured client: registry plus connection manager
pub struct UserStreamApp {
    config: UserStreamConfigFile,
    registry: Arc<HandlerRegistry>,
    manager: KeywordManager,
}

impl UserStreamApp {
    pub fn new(
        config: UserStreamConfigFile,
        registry: Arc<HandlerRegistry>,
        producer: Arc<dyn RequestProducer>,
    ) -> Result<Self, BootstrapError> {
        config.validate()?;
        let manager = KeywordManager::new(producer, registry.clone(), config.connection_config());
        Ok(UserStreamApp {
            config,
            registry,
            manager,
        })
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn manager(&self) -> &KeywordManager {
        &self.manager
    }

    /// Track the configured keywords and connect every configured identity
    pub async fn start(&self) -> Result<KeywordReport, BootstrapError> {
        for keyword in &self.config.keywords {
            self.manager.add_keyword(keyword)?;
        }

        for entry in &self.config.identities {
            let credential = entry
                .credential()
                .ok_or_else(|| ConfigError::MissingCredential(entry.screen_name.clone()))?;
            self.manager.add_connection(entry.identity(credential)).await?;
        }

        let report = self.manager.rebalance();
        info!(
            "Started {} connections tracking {} keywords",
            self.manager.connections().len(),
            self.manager.tracked_count()
        );
        Ok(report)
    }

    pub async fn shutdown(&self) {
        self.manager.shutdown().await;
    }
}
