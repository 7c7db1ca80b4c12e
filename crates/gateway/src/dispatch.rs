//! Handler dispatch registry
//!
//! Routes each notification to at most one callback. Lookup starts at the
//! notification's own kind and walks up the static kind hierarchy, so a
//! callback registered for [`NotificationKind::Event`] serves every event
//! kind that has no callback of its own.

use log::{debug, warn};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use userstream_core::{Notification, NotificationKind, NotificationVariant};

use crate::error::{DispatchError, ParseError};
use crate::parser::StreamHandler;

/// Callback invoked with a dispatched notification
pub type Callback = Arc<dyn Fn(&Notification) + Send + Sync>;

/// Callback invoked with a line that failed to parse
pub type ExceptionCallback = Arc<dyn Fn(&ParseError) + Send + Sync>;

#[derive(Default)]
pub struct HandlerRegistry {
    callbacks: RwLock<HashMap<NotificationKind, Callback>>,
    on_exception: RwLock<Option<ExceptionCallback>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `kind` and everything below it without a
    /// callback of its own
    pub fn register<F>(&self, kind: NotificationKind, callback: F) -> Result<(), DispatchError>
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        let mut callbacks = self.callbacks.write();
        if callbacks.contains_key(&kind) {
            return Err(DispatchError::AlreadyRegistered(kind));
        }
        callbacks.insert(kind, Arc::new(callback));
        debug!("Registered callback for {}", kind);
        Ok(())
    }

    /// Register a callback with a typed payload
    ///
    /// ```ignore
    /// registry.on::<DeleteNotification>(|d| store.remove(d.id))?;
    /// ```
    pub fn on<V: NotificationVariant>(
        &self,
        callback: impl Fn(&V) + Send + Sync + 'static,
    ) -> Result<(), DispatchError> {
        self.register(V::KIND, move |notification: &Notification| {
            if let Some(payload) = V::from_notification(notification) {
                callback(payload);
            }
        })
    }

    /// Register the receiver of parse errors
    pub fn on_exception<F>(&self, callback: F) -> Result<(), DispatchError>
    where
        F: Fn(&ParseError) + Send + Sync + 'static,
    {
        let mut slot = self.on_exception.write();
        if slot.is_some() {
            return Err(DispatchError::ExceptionAlreadyRegistered);
        }
        *slot = Some(Arc::new(callback));
        Ok(())
    }

    pub fn is_registered(&self, kind: NotificationKind) -> bool {
        self.callbacks.read().contains_key(&kind)
    }

    /// Most specific callback for `kind`, if any
    pub fn resolve(&self, kind: NotificationKind) -> Option<Callback> {
        let callbacks = self.callbacks.read();
        kind.lineage().find_map(|k| callbacks.get(&k).cloned())
    }

    /// Invoke the most specific callback for `notification`
    ///
    /// Returns `false` when no callback matched; the notification is dropped.
    pub fn dispatch(&self, notification: &Notification) -> bool {
        // Lock is released before the callback runs
        match self.resolve(notification.kind()) {
            Some(callback) => {
                callback(notification);
                true
            }
            None => false,
        }
    }

    pub fn report(&self, error: &ParseError) {
        let callback = self.on_exception.read().clone();
        match callback {
            Some(callback) => callback(error),
            None => warn!("Unparseable stream line ({}): {}", error, error.raw),
        }
    }
}

impl StreamHandler for HandlerRegistry {
    fn on_notification(&self, notification: Notification) {
        self.dispatch(&notification);
    }

    fn on_exception(&self, error: ParseError) {
        self.report(&error);
    }
}
