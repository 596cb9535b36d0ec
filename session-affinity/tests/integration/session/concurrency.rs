//! Sessions shared by many tasks still pin at most one connection at a time.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use session_affinity::errors::GetConnectionError;
use session_affinity::read_preference::TagSet;
use session_affinity::{AffinityState, MonotonicSession, ReadPreference, Session};

use crate::utils::{setup_tracing, FakeCluster};

const TASKS: usize = 32;

fn new_shared_session() -> (Arc<MonotonicSession>, Arc<FakeCluster>) {
    setup_tracing();
    let cluster =
        Arc::new(FakeCluster::new().with_acquisition_delay(Duration::from_millis(5)));
    let session = Arc::new(MonotonicSession::new(cluster.clone()));
    (session, cluster)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(10000)]
async fn concurrent_reads_share_one_connection() {
    let (session, cluster) = new_shared_session();
    let preference = ReadPreference::nearest();

    let handles = join_all((0..TASKS).map(|_| {
        let session = session.clone();
        let preference = preference.clone();
        tokio::spawn(async move { session.get_connection_for_read(&preference).await })
    }))
    .await
    .into_iter()
    .map(|joined| joined.unwrap().unwrap())
    .collect::<Vec<_>>();

    assert!(handles
        .iter()
        .all(|handle| handle.is_same_connection(&handles[0])));
    assert_eq!(cluster.read_acquisitions(), 1);
    assert_eq!(cluster.releases(), 0);

    session.close().await;
    assert_eq!(cluster.outstanding(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(10000)]
async fn concurrent_reads_and_writes_pin_a_single_connection() {
    let (session, cluster) = new_shared_session();
    let preferences = [
        ReadPreference::secondary(),
        ReadPreference::nearest(),
        ReadPreference::secondary().with_tag_set(TagSet::from_iter([("dc", "west")])),
    ];

    let tasks = (0..TASKS).map(|i| {
        let session = session.clone();
        let preference = preferences[i % preferences.len()].clone();
        tokio::spawn(async move {
            if i % 8 == 7 {
                session.get_connection_for_write().await
            } else {
                session.get_connection_for_read(&preference).await
            }
        })
    });
    for joined in join_all(tasks).await {
        joined.unwrap().unwrap();
    }

    assert_eq!(session.affinity_state().await, AffinityState::WritePinned);
    assert_eq!(cluster.write_acquisitions(), 1);
    // Everything but the write connection has been handed back.
    assert_eq!(cluster.outstanding(), 1);
    assert_eq!(cluster.double_releases(), 0);

    // From now on all requests are served by the write connection.
    let write = session.get_connection_for_write().await.unwrap();
    for preference in &preferences {
        let read = session.get_connection_for_read(preference).await.unwrap();
        assert!(read.is_same_connection(&write));
    }

    session.close().await;
    assert_eq!(cluster.outstanding(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(10000)]
async fn close_racing_with_requests_leaks_nothing() {
    let (session, cluster) = new_shared_session();

    let requests = (0..TASKS).map(|i| {
        let session = session.clone();
        tokio::spawn(async move {
            if i % 2 == 0 {
                session.get_connection_for_write().await
            } else {
                session
                    .get_connection_for_read(&ReadPreference::secondary_preferred())
                    .await
            }
        })
    });
    let closer = {
        let session = session.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2)).await;
            session.close().await;
        })
    };

    let results = join_all(requests).await;
    closer.await.unwrap();

    for result in results {
        match result.unwrap() {
            Ok(_) | Err(GetConnectionError::StateError) => (),
            Err(err) => panic!("Unexpected error: {err}"),
        }
    }
    assert!(session.is_closed());
    assert_eq!(session.affinity_state().await, AffinityState::Closed);
    assert_eq!(cluster.outstanding(), 0);
    assert_eq!(cluster.double_releases(), 0);
}
