//! End-to-end session behavior: refresh dedup, expiry handling and
//! client caching.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::future;

use refresh_session::prelude::*;
use refresh_session::{CacheConfig, CustomSource, DefaultClientFactory};

/// Source that counts invocations and hands out snapshots from a
/// script, sleeping a little to widen race windows.
struct CountingSource {
    calls: AtomicUsize,
    delay: Duration,
    expiries: Vec<i64>,
}

impl CountingSource {
    fn new(delay: Duration, expiries: Vec<i64>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
            expiries,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialSource for CountingSource {
    fn method(&self) -> &'static str {
        "counting"
    }

    async fn credentials(&self) -> Result<CredentialSnapshot> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let offset = self.expiries[index.min(self.expiries.len() - 1)];
        RawCredentials {
            access_key: Some(format!("AKID{index}")),
            secret_key: Some("sk".to_string()),
            token: Some("tk".to_string()),
            expiry_time: Some((Utc::now() + chrono::Duration::seconds(offset)).to_rfc3339()),
        }
        .into_snapshot(self.method())
    }

    async fn identity(&self) -> Result<Identity> {
        Ok(Identity::from([(
            "method".to_string(),
            "counting".to_string(),
        )]))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_readers_share_one_refresh() {
    let source = CountingSource::new(Duration::from_millis(50), vec![3600]);
    let controller =
        Arc::new(RefreshController::new(source.clone(), RefreshConfig::default()).unwrap());

    let readers = (0..16)
        .map(|_| {
            let controller = controller.clone();
            tokio::spawn(async move { controller.current().await.unwrap() })
        })
        .collect::<Vec<_>>();

    let snapshots = future::try_join_all(readers).await.unwrap();

    assert_eq!(source.calls(), 1);
    for snapshot in &snapshots[1..] {
        assert!(Arc::ptr_eq(&snapshots[0], snapshot));
    }
}

#[tokio::test]
async fn expired_seed_is_replaced_on_the_very_next_read() {
    let source = CountingSource::new(Duration::ZERO, vec![3600]);
    let controller = RefreshController::new(source.clone(), RefreshConfig::default()).unwrap();
    controller.seed(CredentialSnapshot::new(
        "STALE",
        "sk",
        "tk",
        Utc::now() - chrono::Duration::minutes(5),
    ));

    let snapshot = controller.current().await.unwrap();
    assert_eq!(source.calls(), 1);
    assert_eq!(snapshot.access_key, "AKID0");
}

#[tokio::test]
async fn eager_open_replaces_expired_first_fetch() {
    // First fetch yields already-expired credentials, second a fresh set.
    let source = CountingSource::new(Duration::ZERO, vec![-300, 3600]);
    let session = Session::builder(source.clone())
        .config(SessionConfig {
            refresh: RefreshConfig {
                defer_refresh: false,
                ..RefreshConfig::default()
            },
            ..SessionConfig::default()
        })
        .build()
        .unwrap();

    session.open().await.unwrap();

    let credentials = session.credentials().await.unwrap();
    assert_eq!(credentials.access_key, "AKID1");
    assert!(source.calls() >= 2);
}

struct CountingFactory {
    builds: AtomicUsize,
}

impl ClientFactory for CountingFactory {
    fn build(
        &self,
        service: &str,
        credentials: &CredentialSnapshot,
        params: &ClientParams,
    ) -> Result<Arc<dyn ClientHandle>> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        DefaultClientFactory.build(service, credentials, params)
    }
}

#[tokio::test]
async fn repeated_get_client_is_idempotent() {
    let factory = Arc::new(CountingFactory {
        builds: AtomicUsize::new(0),
    });
    let session = Session::builder(CountingSource::new(Duration::ZERO, vec![3600]))
        .factory(factory.clone())
        .build()
        .unwrap();

    let params = ClientParams {
        region_name: Some("us-west-2".to_string()),
        ..ClientParams::default()
    };
    let first = session.client("s3", &params).await.unwrap();
    let second = session.client("s3", &params).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(factory.builds.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn racing_get_client_calls_converge_on_one_handle() {
    let session = Arc::new(
        Session::builder(CountingSource::new(Duration::from_millis(20), vec![3600]))
            .config(SessionConfig {
                cache: CacheConfig {
                    max_size: 4,
                    ..CacheConfig::default()
                },
                ..SessionConfig::default()
            })
            .build()
            .unwrap(),
    );

    let tasks = (0..8)
        .map(|_| {
            let session = session.clone();
            tokio::spawn(async move {
                session.client("s3", &ClientParams::default()).await.unwrap()
            })
        })
        .collect::<Vec<_>>();

    let handles = future::try_join_all(tasks).await.unwrap();

    let cached = session
        .cache()
        .and_then(|cache| cache.get(&ClientParams::default().cache_key("s3")))
        .expect("client cached");
    for handle in &handles {
        assert!(Arc::ptr_eq(handle, &cached));
    }
    assert_eq!(session.cache().map(|cache| cache.len()), Some(1));
}

#[tokio::test]
async fn custom_source_missing_token_names_the_field() {
    let source = CustomSource::new("incomplete_getter", || {
        Box::pin(async {
            Ok(RawCredentials {
                access_key: Some("AKIDEXAMPLE".to_string()),
                secret_key: Some("sk".to_string()),
                expiry_time: Some("2026-01-01T00:00:00Z".to_string()),
                ..RawCredentials::default()
            })
        })
    });
    let session = Session::builder(Arc::new(source)).build().unwrap();

    let err = session.credentials().await.unwrap_err();
    match err {
        SessionError::IncompleteCredentials { method, missing } => {
            assert_eq!(method, "custom");
            assert_eq!(missing, vec!["token"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn unknown_strategy_lists_registered_names() {
    let registry = SessionRegistry::builtin(Collaborators::default());
    let err = registry
        .create_session("assume_role", SessionParams::default())
        .await
        .unwrap_err();

    match err {
        SessionError::InvalidStrategy { name, available } => {
            assert_eq!(name, "assume_role");
            assert!(available.is_empty());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn frozen_snapshot_survives_replacement() {
    let source = CountingSource::new(Duration::ZERO, vec![-300, 3600]);
    let controller = RefreshController::new(source, RefreshConfig::default()).unwrap();

    let stale = controller.current().await.unwrap();
    let stale_key = stale.access_key.clone();

    // Snapshot is expired, so the next read refreshes; the old Arc is
    // untouched by the swap.
    let fresh = controller.current().await.unwrap();

    assert_eq!(stale.access_key, stale_key);
    assert_ne!(fresh.access_key, stale.access_key);
}
