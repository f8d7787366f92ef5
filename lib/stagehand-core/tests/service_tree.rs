use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use stagehand_core::{
    error::{GenericError, ServiceError},
    retry::RetryPolicy,
    service::{CollectionService, Service, ServiceNode, TieredService},
};

type EventLog = Arc<Mutex<Vec<String>>>;

struct Recorder {
    name: &'static str,
    log: EventLog,
}

impl Recorder {
    fn node(name: &'static str, log: &EventLog) -> ServiceNode {
        ServiceNode::named_leaf(
            name,
            Recorder {
                name,
                log: Arc::clone(log),
            },
        )
    }

    fn record(&self, operation: &str) {
        self.log.lock().unwrap().push(format!("{}.{}", self.name, operation));
    }
}

#[async_trait]
impl Service for Recorder {
    async fn privileged_start(&self) -> Result<(), GenericError> {
        self.record("privileged_start");
        Ok(())
    }

    async fn start(&self) -> Result<(), GenericError> {
        self.record("start");
        Ok(())
    }

    async fn stop(&self) -> Result<(), GenericError> {
        self.record("stop");
        Ok(())
    }
}

fn position(entries: &[String], entry: &str) -> usize {
    entries.iter().position(|e| e == entry).unwrap()
}

#[tokio::test]
async fn tiers_of_collections_start_and_stop_in_order() {
    let log = EventLog::default();

    let storage = CollectionService::named("storage");
    storage.add_service(Recorder::node("db", &log)).unwrap().await.unwrap();
    storage.add_service(Recorder::node("cache", &log)).unwrap().await.unwrap();

    let frontend = CollectionService::named("frontend");
    frontend.add_service(Recorder::node("api", &log)).unwrap().await.unwrap();

    let root = TieredService::named("root");
    root.add_service(storage.clone().into()).unwrap().await.unwrap();
    root.add_service(frontend.clone().into()).unwrap().await.unwrap();

    let leaves = root.iter().filter_map(|node| node.name().map(String::from)).collect::<Vec<_>>();
    assert_eq!(leaves, vec!["db", "cache", "api"]);

    root.privileged_start().await.unwrap();
    root.start().await.unwrap();
    assert!(root.is_running());
    assert!(root.iter().all(|node| node.is_running()));

    {
        let entries = log.lock().unwrap();
        assert!(position(&entries, "db.privileged_start") < position(&entries, "api.privileged_start"));
        assert!(position(&entries, "db.start") < position(&entries, "api.start"));
        assert!(position(&entries, "cache.start") < position(&entries, "api.start"));
    }

    log.lock().unwrap().clear();
    root.stop().await.unwrap();
    assert!(!root.is_running());
    assert!(root.iter().all(|node| !node.is_running()));

    // Tiers are stopped in the order they were added.
    let entries = log.lock().unwrap();
    assert!(position(&entries, "db.stop") < position(&entries, "api.stop"));
    assert!(position(&entries, "cache.stop") < position(&entries, "api.stop"));
}

#[tokio::test]
async fn service_can_move_between_running_collections() {
    let log = EventLog::default();
    let first = CollectionService::named("first");
    let second = CollectionService::named("second");
    first.start().await.unwrap();
    second.start().await.unwrap();

    let worker = Recorder::node("worker", &log);
    worker.set_parent(&first).await.unwrap();
    worker.set_parent(&second).await.unwrap();

    assert!(first.is_empty());
    assert_eq!(second.get_service_named("worker").unwrap(), worker);
    assert!(worker.is_running());
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "worker.privileged_start",
            "worker.start",
            "worker.stop",
            "worker.privileged_start",
            "worker.start"
        ]
    );
}

#[tokio::test]
async fn running_tiered_service_rejects_reparenting_its_tiers() {
    let log = EventLog::default();
    let tier = Recorder::node("tier", &log);
    let root = TieredService::new();
    root.add_service(tier.clone()).unwrap().await.unwrap();
    root.start().await.unwrap();

    let result = tier.detach().await;
    assert!(matches!(result, Err(ServiceError::IllegalMutation { .. })));
    assert_eq!(tier.parent(), Some(root.as_node().clone()));
    assert!(tier.is_running());
}

#[tokio::test]
async fn leaf_start_can_be_retried() {
    struct FailsOnce {
        attempts: Mutex<usize>,
    }

    #[async_trait]
    impl Service for FailsOnce {
        async fn start(&self) -> Result<(), GenericError> {
            let mut attempts = self.attempts.lock().unwrap();
            *attempts += 1;
            if *attempts == 1 {
                return Err(GenericError::msg("not ready yet"));
            }
            Ok(())
        }
    }

    let node = ServiceNode::leaf(FailsOnce {
        attempts: Mutex::new(0),
    });
    RetryPolicy::new(1).run(|| node.start()).await.unwrap();
    assert!(node.is_running());
}
