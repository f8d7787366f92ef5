use std::{
    ops::Deref,
    sync::{Arc, Mutex},
};

use indexmap::IndexMap;
use snafu::{ensure, OptionExt as _};
use tracing::debug;

use super::{
    node::{lock, NodeKind},
    resolved, ServiceCollection, ServiceFuture, ServiceNode,
};
use crate::{
    completion::gather_results,
    error::{DuplicateName, NotFound, ServiceError},
};

#[derive(Default)]
pub(super) struct CollectionChildren {
    services: Vec<ServiceNode>,
    named: IndexMap<Arc<str>, ServiceNode>,
}

impl CollectionChildren {
    pub(super) fn services(&self) -> &[ServiceNode] {
        &self.services
    }
}

/// A group of services that are started and stopped concurrently.
///
/// Lifecycle operations are issued to every child at once, and the collection's operation resolves once all of them
/// have resolved. If any child fails, the collection fails with the first failure it observes. Children that started
/// successfully are not stopped again, so a failed start can leave the collection partially started.
///
/// Children can be added and removed at any time. Adding a child to a running collection starts it, and removing a
/// child from a running collection stops it.
#[derive(Clone)]
pub struct CollectionService {
    node: ServiceNode,
}

impl CollectionService {
    /// Creates an empty, unnamed collection.
    pub fn new() -> Self {
        Self::from_name(None)
    }

    /// Creates an empty, named collection.
    pub fn named<N: AsRef<str>>(name: N) -> Self {
        Self::from_name(Some(name.as_ref()))
    }

    fn from_name(name: Option<&str>) -> Self {
        Self {
            node: ServiceNode::from_parts(name, NodeKind::Collection(Mutex::new(CollectionChildren::default()))),
        }
    }

    /// Returns the node backing this collection.
    pub fn as_node(&self) -> &ServiceNode {
        &self.node
    }

    /// Adds a child service.
    ///
    /// The child is registered immediately. If the collection is running, the returned future performs the child's
    /// privileged start followed by its start; otherwise it resolves immediately, and the child will be started along
    /// with the rest of the collection.
    ///
    /// # Errors
    ///
    /// If the child is named and a child with the same name already exists, if the child is still attached to another
    /// parent, or if the child is this collection or one of its ancestors, an error is returned.
    pub fn add_service(&self, service: ServiceNode) -> Result<ServiceFuture, ServiceError> {
        add_service(&self.node, self.children(), service)
    }

    /// Removes a child service.
    ///
    /// The child is unregistered immediately. If the collection is running, the returned future stops the child;
    /// otherwise it resolves immediately.
    ///
    /// # Errors
    ///
    /// If the service is not a child of this collection, an error is returned.
    pub fn remove_service(&self, service: &ServiceNode) -> Result<ServiceFuture, ServiceError> {
        remove_service(&self.node, self.children(), service)
    }

    /// Returns the child with the given name.
    ///
    /// # Errors
    ///
    /// If no child has the given name, an error is returned.
    pub fn get_service_named(&self, name: &str) -> Result<ServiceNode, ServiceError> {
        lock(self.children())
            .named
            .get(name)
            .cloned()
            .context(NotFound { service: name })
    }

    /// Returns the number of children.
    pub fn len(&self) -> usize {
        lock(self.children()).services.len()
    }

    /// Returns `true` if the collection has no children.
    pub fn is_empty(&self) -> bool {
        lock(self.children()).services.is_empty()
    }

    fn children(&self) -> &Mutex<CollectionChildren> {
        match self.node.kind() {
            NodeKind::Collection(children) => children,
            _ => unreachable!("collection service must always wrap a collection node"),
        }
    }
}

impl Default for CollectionService {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for CollectionService {
    type Target = ServiceNode;

    fn deref(&self) -> &Self::Target {
        &self.node
    }
}

impl From<CollectionService> for ServiceNode {
    fn from(collection: CollectionService) -> Self {
        collection.node
    }
}

impl ServiceCollection for CollectionService {
    fn as_node(&self) -> &ServiceNode {
        &self.node
    }

    fn add_service(&self, service: ServiceNode) -> Result<ServiceFuture, ServiceError> {
        CollectionService::add_service(self, service)
    }

    fn remove_service(&self, service: &ServiceNode) -> Result<ServiceFuture, ServiceError> {
        CollectionService::remove_service(self, service)
    }
}

pub(super) fn add_service(
    parent: &ServiceNode, children: &Mutex<CollectionChildren>, service: ServiceNode,
) -> Result<ServiceFuture, ServiceError> {
    service.ensure_detached()?;
    service.ensure_not_ancestor_of(parent)?;

    {
        let mut children = lock(children);
        if let Some(name) = service.name() {
            ensure!(!children.named.contains_key(name), DuplicateName { name });
            children.named.insert(Arc::from(name), service.clone());
        }
        children.services.push(service.clone());
    }
    service.attach_to(parent);

    debug!(
        service_id = parent.id().as_usize(),
        child_id = service.id().as_usize(),
        child_name = service.name().unwrap_or_default(),
        "Added child service to collection."
    );

    if !parent.is_running() {
        return Ok(resolved());
    }

    Ok(Box::pin(async move {
        service.privileged_start().await?;
        service.start().await
    }))
}

pub(super) fn remove_service(
    parent: &ServiceNode, children: &Mutex<CollectionChildren>, service: &ServiceNode,
) -> Result<ServiceFuture, ServiceError> {
    let removed = {
        let mut children = lock(children);
        let idx = children
            .services
            .iter()
            .position(|child| child == service)
            .context(NotFound {
                service: service.label(),
            })?;

        let removed = children.services.remove(idx);
        if let Some(name) = removed.name() {
            children.named.shift_remove(name);
        }
        removed
    };
    removed.clear_parent();

    debug!(
        service_id = parent.id().as_usize(),
        child_id = removed.id().as_usize(),
        child_name = removed.name().unwrap_or_default(),
        "Removed child service from collection."
    );

    if parent.is_running() {
        Ok(removed.stop())
    } else {
        Ok(resolved())
    }
}

pub(super) async fn privileged_start(node: ServiceNode) -> Result<(), ServiceError> {
    let children = node.child_services();
    debug!(child_count = children.len(), "Running privileged start for all child services.");

    gather_results(children.iter().map(ServiceNode::privileged_start))
        .await
        .map(|_| ())
}

pub(super) async fn start(node: ServiceNode) -> Result<(), ServiceError> {
    node.set_running(true);

    let children = node.child_services();
    debug!(child_count = children.len(), "Starting all child services.");

    gather_results(children.iter().map(ServiceNode::start)).await.map(|_| ())
}

pub(super) async fn stop(node: ServiceNode) -> Result<(), ServiceError> {
    node.set_running(false);

    let children = node.child_services();
    debug!(child_count = children.len(), "Stopping all child services.");

    gather_results(children.iter().map(ServiceNode::stop)).await.map(|_| ())
}
