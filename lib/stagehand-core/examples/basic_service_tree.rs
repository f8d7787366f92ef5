use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use stagehand_app::prelude::*;
use stagehand_config::ConfigurationLoader;
use stagehand_core::{
    error::GenericError,
    retry::{RetryConfiguration, RetryPolicy},
    service::{CollectionService, Service, ServiceNode, TieredService},
};
use stagehand_error::generic_error;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), GenericError> {
    initialize_logging(None)?;

    // Retry behavior can be overridden with `stagehand.yaml` in the working directory, or with environment variables
    // such as `STAGEHAND_MAX_RETRIES=5` and `STAGEHAND_MIN_BACKOFF_MS=250`.
    let retry_config = ConfigurationLoader::default()
        .try_from_yaml("stagehand.yaml")
        .from_environment("STAGEHAND")?
        .into_typed::<RetryConfiguration>()?;
    info!(?retry_config, "Loaded retry configuration.");
    let retry_policy = retry_config.into_policy();

    // Build the tree: storage services start first, in parallel, and the frontend only starts once they are all up.
    let storage = CollectionService::named("storage");
    storage
        .add_service(ServiceNode::named_leaf(
            "database",
            FlakyConnection::new("database", 2, retry_policy.clone()),
        ))?
        .await?;
    storage
        .add_service(ServiceNode::named_leaf(
            "cache",
            FlakyConnection::new("cache", 0, retry_policy),
        ))?
        .await?;

    let frontend = CollectionService::named("frontend");
    frontend
        .add_service(ServiceNode::named_leaf("http-listener", Listener { port: 8080 }))?
        .await?;

    let root = TieredService::named("root");
    root.add_service(storage.into())?.await?;
    root.add_service(frontend.into())?.await?;

    info!("Running privileged startup...");
    root.privileged_start().await?;

    info!("Starting service tree...");
    if let Err(e) = root.start().await {
        for service in root.iter() {
            info!(service = service.name().unwrap_or_default(), running = service.is_running(), "Service state.");
        }
        fatal_and_exit(format!("service tree failed to start: {}", e));
    }

    let run_time = Duration::from_secs(2);
    info!("Service tree started. Running for {:?} before shutting down...", run_time);
    tokio::time::sleep(run_time).await;

    info!("Stopping service tree...");
    root.stop().await?;
    info!("Service tree stopped.");

    Ok(())
}

/// A service whose connection attempts fail a fixed number of times before succeeding.
struct FlakyConnection {
    name: &'static str,
    failures_remaining: AtomicUsize,
    retry_policy: RetryPolicy,
}

impl FlakyConnection {
    fn new(name: &'static str, failures: usize, retry_policy: RetryPolicy) -> Self {
        Self {
            name,
            failures_remaining: AtomicUsize::new(failures),
            retry_policy,
        }
    }

    async fn connect(&self) -> Result<(), GenericError> {
        let remaining = self.failures_remaining.load(Ordering::Relaxed);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::Relaxed);
            warn!(service = self.name, "Connection attempt failed.");
            return Err(generic_error!("connection to {} refused", self.name));
        }

        Ok(())
    }
}

#[async_trait]
impl Service for FlakyConnection {
    async fn start(&self) -> Result<(), GenericError> {
        self.retry_policy.run(|| self.connect()).await?;
        info!(service = self.name, "Connected.");
        Ok(())
    }

    async fn stop(&self) -> Result<(), GenericError> {
        info!(service = self.name, "Disconnected.");
        Ok(())
    }
}

/// A service that binds a port during privileged startup.
struct Listener {
    port: u16,
}

#[async_trait]
impl Service for Listener {
    async fn privileged_start(&self) -> Result<(), GenericError> {
        info!(port = self.port, "Bound listener port.");
        Ok(())
    }

    async fn start(&self) -> Result<(), GenericError> {
        info!(port = self.port, "Accepting connections.");
        Ok(())
    }

    async fn stop(&self) -> Result<(), GenericError> {
        info!(port = self.port, "Stopped accepting connections.");
        Ok(())
    }
}
