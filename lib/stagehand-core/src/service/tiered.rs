use std::{ops::Deref, sync::Mutex};

use snafu::OptionExt as _;
use tracing::debug;

use super::{
    node::{lock, NodeKind},
    resolved, ServiceCollection, ServiceFuture, ServiceNode,
};
use crate::error::{IllegalMutation, NotFound, ServiceError};

/// A sequence of services that are started and stopped one at a time.
///
/// Each child is a _tier_. Services which belong to the same tier should be grouped into a
/// [`CollectionService`][super::CollectionService], which is then added as a single tier.
///
/// Each tier is only started once the previous tier has started successfully. If a tier fails, the tiers after it are
/// never started, and the tiers before it are left running.
///
/// # Stopping
///
/// Tiers are stopped in the same order they were added, not in reverse, and one at a time. When tiers depend on each
/// other, the dependent tiers need to be arranged so that this order is correct, for example by nesting a separate
/// tiered service. The tiered service itself is only marked as stopped once every tier has stopped.
///
/// # Mutation
///
/// Tiers can only be added or removed while the tiered service is not running, since the sequencing of an in-flight
/// start or stop would otherwise race with the structural change.
#[derive(Clone)]
pub struct TieredService {
    node: ServiceNode,
}

impl TieredService {
    /// Creates an empty, unnamed tiered service.
    pub fn new() -> Self {
        Self::from_name(None)
    }

    /// Creates an empty, named tiered service.
    pub fn named<N: AsRef<str>>(name: N) -> Self {
        Self::from_name(Some(name.as_ref()))
    }

    fn from_name(name: Option<&str>) -> Self {
        Self {
            node: ServiceNode::from_parts(name, NodeKind::Tiered(Mutex::new(Vec::new()))),
        }
    }

    /// Returns the node backing this tiered service.
    pub fn as_node(&self) -> &ServiceNode {
        &self.node
    }

    /// Appends a tier.
    ///
    /// The returned future always resolves immediately, as the tiered service is not running.
    ///
    /// # Errors
    ///
    /// If the tiered service is running, if the tier is still attached to another parent, or if the tier is this tiered
    /// service or one of its ancestors, an error is returned.
    pub fn add_service(&self, service: ServiceNode) -> Result<ServiceFuture, ServiceError> {
        add_service(&self.node, self.tiers(), service)
    }

    /// Removes a tier.
    ///
    /// The returned future always resolves immediately, as the tiered service is not running.
    ///
    /// # Errors
    ///
    /// If the tiered service is running, or if the service is not one of its tiers, an error is returned.
    pub fn remove_service(&self, service: &ServiceNode) -> Result<ServiceFuture, ServiceError> {
        remove_service(&self.node, self.tiers(), service)
    }

    /// Returns the number of tiers.
    pub fn len(&self) -> usize {
        lock(self.tiers()).len()
    }

    /// Returns `true` if there are no tiers.
    pub fn is_empty(&self) -> bool {
        lock(self.tiers()).is_empty()
    }

    fn tiers(&self) -> &Mutex<Vec<ServiceNode>> {
        match self.node.kind() {
            NodeKind::Tiered(tiers) => tiers,
            _ => unreachable!("tiered service must always wrap a tiered node"),
        }
    }
}

impl Default for TieredService {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for TieredService {
    type Target = ServiceNode;

    fn deref(&self) -> &Self::Target {
        &self.node
    }
}

impl From<TieredService> for ServiceNode {
    fn from(tiered: TieredService) -> Self {
        tiered.node
    }
}

impl ServiceCollection for TieredService {
    fn as_node(&self) -> &ServiceNode {
        &self.node
    }

    fn add_service(&self, service: ServiceNode) -> Result<ServiceFuture, ServiceError> {
        TieredService::add_service(self, service)
    }

    fn remove_service(&self, service: &ServiceNode) -> Result<ServiceFuture, ServiceError> {
        TieredService::remove_service(self, service)
    }
}

// If this is ever relaxed, beware of races between adding or removing tiers and the sequencing of a start or stop that
// has not yet resolved.
fn ensure_not_running(node: &ServiceNode, operation: &'static str) -> Result<(), ServiceError> {
    if node.is_running() {
        return IllegalMutation {
            service: node.label(),
            operation,
        }
        .fail();
    }
    Ok(())
}

pub(super) fn add_service(
    parent: &ServiceNode, tiers: &Mutex<Vec<ServiceNode>>, service: ServiceNode,
) -> Result<ServiceFuture, ServiceError> {
    ensure_not_running(parent, "add_service")?;
    service.ensure_detached()?;
    service.ensure_not_ancestor_of(parent)?;

    lock(tiers).push(service.clone());
    service.attach_to(parent);

    debug!(
        service_id = parent.id().as_usize(),
        child_id = service.id().as_usize(),
        child_name = service.name().unwrap_or_default(),
        "Added tier to tiered service."
    );

    Ok(resolved())
}

pub(super) fn remove_service(
    parent: &ServiceNode, tiers: &Mutex<Vec<ServiceNode>>, service: &ServiceNode,
) -> Result<ServiceFuture, ServiceError> {
    ensure_not_running(parent, "remove_service")?;

    let removed = {
        let mut tiers = lock(tiers);
        let idx = tiers.iter().position(|tier| tier == service).context(NotFound {
            service: service.label(),
        })?;
        tiers.remove(idx)
    };
    removed.clear_parent();

    debug!(
        service_id = parent.id().as_usize(),
        child_id = removed.id().as_usize(),
        child_name = removed.name().unwrap_or_default(),
        "Removed tier from tiered service."
    );

    Ok(resolved())
}

pub(super) async fn privileged_start(node: ServiceNode) -> Result<(), ServiceError> {
    for (tier_idx, tier) in node.child_services().into_iter().enumerate() {
        debug!(tier_idx, "Running privileged start for tier.");
        tier.privileged_start().await?;
    }

    Ok(())
}

pub(super) async fn start(node: ServiceNode) -> Result<(), ServiceError> {
    node.set_running(true);

    for (tier_idx, tier) in node.child_services().into_iter().enumerate() {
        debug!(tier_idx, "Starting tier.");
        tier.start().await?;
    }

    Ok(())
}

pub(super) async fn stop(node: ServiceNode) -> Result<(), ServiceError> {
    for (tier_idx, tier) in node.child_services().into_iter().enumerate() {
        debug!(tier_idx, "Stopping tier.");
        tier.stop().await?;
    }

    // Only marked as stopped once every tier has stopped, so the service reads as running for the whole teardown.
    node.set_running(false);
    Ok(())
}
