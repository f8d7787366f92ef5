//! Service trees.
//!
//! A service tree is a hierarchy of long-lived components that are started and stopped together. Every node in the tree
//! is a [`ServiceNode`], which comes in one of three kinds:
//!
//! - **leaf**: wraps a user-supplied [`Service`] implementation that does the actual work
//! - **collection** ([`CollectionService`]): a set of children that are started and stopped concurrently
//! - **tiered** ([`TieredService`]): an ordered list of children (tiers) that are started and stopped one at a time
//!
//! Trees are built by nesting: a tiered service whose tiers are collections starts each group of siblings in parallel,
//! and only moves on to the next group once the previous one has fully started.
//!
//! # Completion
//!
//! Every lifecycle operation returns a [`ServiceFuture`] which resolves once the operation, and all of the operations it
//! cascaded into, have finished. Like any future, nothing happens until it is polled. Structural changes
//! (`add_service`, `remove_service`) take effect immediately, and return a future that covers any start or stop the
//! change implies.
//!
//! # Failure
//!
//! Failures are fail-fast and are never rolled back. A collection reports the first child failure it observes, and a
//! tiered service never starts the tiers after a failed one. Callers that need to reconcile a partially-started tree
//! can inspect [`ServiceNode::is_running`] on each node.

use std::{future::Future, pin::Pin};

use async_trait::async_trait;

use crate::error::{GenericError, ServiceError};

mod collection;
pub use self::collection::CollectionService;

mod node;
pub use self::node::{Id, NoopService, ServiceNode};

mod tiered;
pub use self::tiered::TieredService;

/// A `Future` that represents a lifecycle operation on a service node.
pub type ServiceFuture = Pin<Box<dyn Future<Output = Result<(), ServiceError>> + Send>>;

/// Behavior of a leaf service.
///
/// Each hook defaults to doing nothing and succeeding immediately, so implementors only need to override the hooks they
/// care about.
#[async_trait]
pub trait Service: Send + Sync {
    /// Performs any startup work that must happen before regular startup, such as binding privileged ports.
    async fn privileged_start(&self) -> Result<(), GenericError> {
        Ok(())
    }

    /// Starts the service.
    async fn start(&self) -> Result<(), GenericError> {
        Ok(())
    }

    /// Stops the service.
    async fn stop(&self) -> Result<(), GenericError> {
        Ok(())
    }
}

/// A service node that owns child services.
///
/// Implemented by [`CollectionService`] and [`TieredService`], this is the registration side of
/// [`ServiceNode::set_parent`].
pub trait ServiceCollection: Clone + Send + Sync + 'static {
    /// Returns the node backing this collection.
    fn as_node(&self) -> &ServiceNode;

    /// Adds a child service.
    ///
    /// The child is registered immediately. The returned future resolves once any startup implied by the registration
    /// has completed.
    ///
    /// # Errors
    ///
    /// If the child cannot be registered, an error is returned and the collection is left unchanged.
    fn add_service(&self, service: ServiceNode) -> Result<ServiceFuture, ServiceError>;

    /// Removes a child service.
    ///
    /// The child is unregistered immediately. The returned future resolves once any shutdown implied by the removal
    /// has completed.
    ///
    /// # Errors
    ///
    /// If the child cannot be removed, an error is returned and the collection is left unchanged.
    fn remove_service(&self, service: &ServiceNode) -> Result<ServiceFuture, ServiceError>;
}

fn resolved() -> ServiceFuture {
    Box::pin(std::future::ready(Ok(())))
}
