//! # Manager builder.
//!
//! [`ManagerBuilder`] wires the optional collaborators of a [`Manager`]:
//! event subscribers, a manager-wide [`RunHook`] and a custom [`ErrorHandler`].
//!
//! ```rust
//! use std::sync::Arc;
//! use taskgate::{Manager, ManagerConfig, TracingErrorHandler};
//!
//! let mgr = Manager::builder(ManagerConfig::default())
//!     .with_error_handler(Arc::new(TracingErrorHandler))
//!     .build();
//! # let _ = mgr;
//! ```

use std::sync::Arc;

use super::{config::ManagerConfig, manager::Manager};
use crate::{
    events::Bus,
    hooks::{ErrorHandler, RunHook, TracingErrorHandler},
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for constructing a [`Manager`] with optional features.
pub struct ManagerBuilder {
    cfg: ManagerConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    hook: Option<Arc<dyn RunHook>>,
    handler: Arc<dyn ErrorHandler>,
}

impl ManagerBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: ManagerConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            hook: None,
            handler: Arc::new(TracingErrorHandler),
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive engine events through dedicated workers with bounded
    /// queues. With a non-empty list, [`build`](Self::build) must run inside a tokio runtime.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Sets the hook invoked around every run of every task.
    pub fn with_hook(mut self, hook: Arc<dyn RunHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Replaces the default [`TracingErrorHandler`].
    pub fn with_error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Builds the manager in the `NotStarted` phase.
    pub fn build(self) -> Arc<Manager> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = SubscriberSet::new(self.subscribers, bus.clone());
        Arc::new(Manager::new_internal(
            self.cfg,
            subs,
            bus,
            self.hook,
            self.handler,
        ))
    }
}
