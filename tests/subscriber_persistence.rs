use kubenotify::store::{SqliteStorage, SubscriberStore, UnmonitorOutcome, Verbosity};
use std::fs;
use std::sync::Arc;

#[tokio::test]
async fn test_subscriptions_survive_reopen() {
    let db_location = "/tmp/test_persistence_kubenotify.db";
    let _ = fs::remove_file(db_location);

    {
        let store = SubscriberStore::new(Arc::new(SqliteStorage::open(db_location).await.unwrap()));
        store.monitor("alice", "web-1").await.unwrap();
        store.set_verbosity("alice", Verbosity::Warn).await.unwrap();
        store.get_or_create("bob").await.unwrap();
    }

    let store = SubscriberStore::new(Arc::new(SqliteStorage::open(db_location).await.unwrap()));
    assert_eq!(store.reconcile_index().await.unwrap(), 0);
    assert_eq!(store.pod_subscribers().await.unwrap(), vec!["alice"]);
    assert_eq!(store.all_subscribers().await.unwrap(), vec!["alice", "bob"]);

    let alice = store.get("alice").await.unwrap().unwrap();
    assert_eq!(alice.verbosity, Verbosity::Warn);
    assert!(alice.monitored.contains("web-1"));

    assert_eq!(
        store.unmonitor("alice", "web-1").await.unwrap(),
        UnmonitorOutcome::Removed
    );
    assert!(store.pod_subscribers().await.unwrap().is_empty());

    let _ = fs::remove_file(db_location);
}
