use std::{
    fmt,
    future::Future,
    sync::{
        atomic::{
            AtomicBool, AtomicUsize,
            Ordering::{Acquire, Relaxed, Release},
        },
        Arc, Mutex, MutexGuard, PoisonError, Weak,
    },
    vec,
};

use snafu::ResultExt as _;
use tracing::{debug, debug_span, Instrument as _};

use super::{
    collection::{self, CollectionChildren},
    tiered, Service, ServiceCollection, ServiceFuture,
};
use crate::error::{AlreadyAttached, Failed, NotFound, ServiceError, WouldCycle};

static GLOBAL_SERVICE_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Service identifier.
///
/// A simple, numeric identifier that uniquely identifies a service node within the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Id(usize);

impl Id {
    fn new() -> Self {
        let id = GLOBAL_SERVICE_ID_COUNTER.fetch_add(1, Relaxed);
        Self(id)
    }

    /// Returns the identifier as a plain integer.
    pub fn as_usize(&self) -> usize {
        self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A service that does nothing.
///
/// Used as the behavior of bare leaf nodes.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopService;

impl Service for NoopService {}

pub(super) enum NodeKind {
    Leaf(Arc<dyn Service>),
    Collection(Mutex<CollectionChildren>),
    Tiered(Mutex<Vec<ServiceNode>>),
}

impl NodeKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Leaf(_) => "leaf",
            Self::Collection(_) => "collection",
            Self::Tiered(_) => "tiered",
        }
    }
}

struct Inner {
    id: Id,
    name: Option<Arc<str>>,
    running: AtomicBool,
    parent: Mutex<Option<Weak<Inner>>>,
    kind: NodeKind,
}

/// A node in a service tree.
///
/// `ServiceNode` is a cheaply cloneable handle: clones refer to the same underlying node. Parents hold their children
/// by handle, while children only hold a weak reference back to their parent, so a detached subtree is freed once the
/// last handle to it is dropped.
///
/// # Iteration
///
/// Iterating a leaf yields the leaf itself, iterating a collection yields its direct children, and iterating a tiered
/// service yields the concatenated iteration of each tier. This lets callers treat single services and groups of
/// services interchangeably.
#[derive(Clone)]
pub struct ServiceNode {
    inner: Arc<Inner>,
}

impl ServiceNode {
    /// Creates a bare, unnamed leaf node with no behavior.
    pub fn bare() -> Self {
        Self::leaf(NoopService)
    }

    /// Creates an unnamed leaf node driven by the given service.
    pub fn leaf<S>(service: S) -> Self
    where
        S: Service + 'static,
    {
        Self::from_parts(None, NodeKind::Leaf(Arc::new(service)))
    }

    /// Creates a named leaf node driven by the given service.
    ///
    /// Names must be unique among the children of a [`CollectionService`][super::CollectionService].
    pub fn named_leaf<N, S>(name: N, service: S) -> Self
    where
        N: AsRef<str>,
        S: Service + 'static,
    {
        Self::from_parts(Some(name.as_ref()), NodeKind::Leaf(Arc::new(service)))
    }

    pub(super) fn from_parts(name: Option<&str>, kind: NodeKind) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: Id::new(),
                name: name.map(Arc::from),
                running: AtomicBool::new(false),
                parent: Mutex::new(None),
                kind,
            }),
        }
    }

    /// Returns the node's identifier.
    pub fn id(&self) -> Id {
        self.inner.id
    }

    /// Returns the node's name, if it has one.
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Returns `true` if the node is running.
    ///
    /// For leaves, this is `true` from the moment `start` completes successfully until `stop` is called.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Acquire)
    }

    /// Returns the node's parent, if it is attached to one.
    pub fn parent(&self) -> Option<ServiceNode> {
        lock(&self.inner.parent)
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| ServiceNode { inner })
    }

    /// Starts the node's privileged phase.
    ///
    /// Privileged start never changes the running state of a node.
    pub fn privileged_start(&self) -> ServiceFuture {
        let fut: ServiceFuture = match &self.inner.kind {
            NodeKind::Leaf(service) => Box::pin(privileged_start_leaf(self.clone(), Arc::clone(service))),
            NodeKind::Collection(_) => Box::pin(collection::privileged_start(self.clone())),
            NodeKind::Tiered(_) => Box::pin(tiered::privileged_start(self.clone())),
        };
        self.instrumented("privileged_start", fut)
    }

    /// Starts the node.
    pub fn start(&self) -> ServiceFuture {
        let fut: ServiceFuture = match &self.inner.kind {
            NodeKind::Leaf(service) => Box::pin(start_leaf(self.clone(), Arc::clone(service))),
            NodeKind::Collection(_) => Box::pin(collection::start(self.clone())),
            NodeKind::Tiered(_) => Box::pin(tiered::start(self.clone())),
        };
        self.instrumented("start", fut)
    }

    /// Stops the node.
    pub fn stop(&self) -> ServiceFuture {
        let fut: ServiceFuture = match &self.inner.kind {
            NodeKind::Leaf(service) => Box::pin(stop_leaf(self.clone(), Arc::clone(service))),
            NodeKind::Collection(_) => Box::pin(collection::stop(self.clone())),
            NodeKind::Tiered(_) => Box::pin(tiered::stop(self.clone())),
        };
        self.instrumented("stop", fut)
    }

    /// Moves the node under a new parent.
    ///
    /// If the node is currently attached, it is first detached from its current parent, and the returned future waits
    /// for that detachment (including any stop it implies) before registering with `parent`. Registration may start the
    /// node if `parent` is running. If registration fails, the node is left detached.
    pub fn set_parent<P>(&self, parent: &P) -> ServiceFuture
    where
        P: ServiceCollection,
    {
        let node = self.clone();
        let parent = parent.clone();
        let fut = async move {
            if node.parent().is_some() {
                debug!("Detaching from current parent before reparenting.");
                node.detach().await?;
            }

            parent.add_service(node)?.await
        };
        self.instrumented("set_parent", fut)
    }

    /// Detaches the node from its parent.
    ///
    /// The parent removes the node from its children, stopping it first if the parent is running. The returned future
    /// resolves once that stop has completed. Detaching a node without a parent does nothing.
    pub fn detach(&self) -> ServiceFuture {
        let node = self.clone();
        let fut = async move {
            match node.parent() {
                Some(parent) => parent.remove_child(&node)?.await,
                None => {
                    // Clears a dangling link left behind by a parent that was dropped.
                    node.clear_parent();
                    Ok(())
                }
            }
        };
        self.instrumented("detach", fut)
    }

    /// Returns an iterator over the node.
    ///
    /// See [Iteration](#iteration) for what is yielded for each kind of node.
    pub fn iter(&self) -> vec::IntoIter<ServiceNode> {
        match &self.inner.kind {
            NodeKind::Leaf(_) => vec![self.clone()].into_iter(),
            NodeKind::Collection(_) => self.child_services().into_iter(),
            NodeKind::Tiered(_) => self
                .child_services()
                .iter()
                .flat_map(ServiceNode::iter)
                .collect::<Vec<_>>()
                .into_iter(),
        }
    }

    pub(super) fn kind(&self) -> &NodeKind {
        &self.inner.kind
    }

    pub(super) fn set_running(&self, running: bool) {
        self.inner.running.store(running, Release);
    }

    /// Returns the name of the node, or its identifier if it is unnamed.
    pub(super) fn label(&self) -> String {
        match self.name() {
            Some(name) => name.to_string(),
            None => self.inner.id.to_string(),
        }
    }

    pub(super) fn child_services(&self) -> Vec<ServiceNode> {
        match &self.inner.kind {
            NodeKind::Leaf(_) => Vec::new(),
            NodeKind::Collection(children) => lock(children).services().to_vec(),
            NodeKind::Tiered(tiers) => lock(tiers).clone(),
        }
    }

    pub(super) fn ensure_detached(&self) -> Result<(), ServiceError> {
        if self.parent().is_some() {
            return AlreadyAttached { service: self.label() }.fail();
        }
        Ok(())
    }

    pub(super) fn ensure_not_ancestor_of(&self, parent: &ServiceNode) -> Result<(), ServiceError> {
        let mut current = Some(parent.clone());
        while let Some(node) = current {
            if node == *self {
                return WouldCycle { service: self.label() }.fail();
            }
            current = node.parent();
        }
        Ok(())
    }

    pub(super) fn attach_to(&self, parent: &ServiceNode) {
        *lock(&self.inner.parent) = Some(Arc::downgrade(&parent.inner));
    }

    pub(super) fn clear_parent(&self) {
        lock(&self.inner.parent).take();
    }

    fn remove_child(&self, child: &ServiceNode) -> Result<ServiceFuture, ServiceError> {
        match &self.inner.kind {
            NodeKind::Collection(children) => collection::remove_service(self, children, child),
            NodeKind::Tiered(tiers) => tiered::remove_service(self, tiers, child),
            NodeKind::Leaf(_) => NotFound { service: child.label() }.fail(),
        }
    }

    fn instrumented<F>(&self, operation: &'static str, fut: F) -> ServiceFuture
    where
        F: Future<Output = Result<(), ServiceError>> + Send + 'static,
    {
        let span = debug_span!(
            "service",
            service_id = self.inner.id.as_usize(),
            service_name = self.name().unwrap_or_default(),
            service_kind = self.inner.kind.as_str(),
            operation,
        );
        Box::pin(fut.instrument(span))
    }
}

impl PartialEq for ServiceNode {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ServiceNode {}

impl fmt::Debug for ServiceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceNode")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("kind", &self.inner.kind.as_str())
            .field("running", &self.is_running())
            .finish()
    }
}

impl<'a> IntoIterator for &'a ServiceNode {
    type Item = ServiceNode;
    type IntoIter = vec::IntoIter<ServiceNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

async fn privileged_start_leaf(node: ServiceNode, service: Arc<dyn Service>) -> Result<(), ServiceError> {
    service.privileged_start().await.context(Failed {
        service: node.label(),
        operation: "privileged_start",
    })
}

async fn start_leaf(node: ServiceNode, service: Arc<dyn Service>) -> Result<(), ServiceError> {
    service.start().await.context(Failed {
        service: node.label(),
        operation: "start",
    })?;

    node.set_running(true);
    debug!("Service started.");
    Ok(())
}

async fn stop_leaf(node: ServiceNode, service: Arc<dyn Service>) -> Result<(), ServiceError> {
    node.set_running(false);

    service.stop().await.context(Failed {
        service: node.label(),
        operation: "stop",
    })?;

    debug!("Service stopped.");
    Ok(())
}

// Guards are only ever held for short, synchronous sections that cannot leave the protected data in an inconsistent
// state, so a poisoned lock is still safe to use.
pub(super) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
