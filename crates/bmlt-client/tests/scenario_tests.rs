//! End-to-end session scenario and cross-operation delivery order.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bmlt_client::{Event, NotificationContext, Session, SessionObserver};
use bmlt_protocol::{BmltError, ErrorKind, MeetingNode};
use common::*;
use pretty_assertions::assert_eq;
use serde_json::json;

#[tokio::test]
async fn test_validate_search_login_and_refused_delete() {
    let root = MockRoot::with_reference_data(5).await;
    client("GetSearchResults")
        .respond_with(json_response(json!([meeting(40, 2), meeting(41, 2), meeting(42, 3)])))
        .mount(&root.server)
        .await;
    root.mount_meeting(42, 3).await;
    root.mount_admin("admin", "right", &[(2, 2)]).await;
    admin("delete_meeting")
        .respond_with(json_response(json!({"meeting_id": "42"})))
        .expect(0)
        .mount(&root.server)
        .await;

    let (session, mut rx) = connect(&root);
    assert_eq!(next(&mut rx).await.event, Event::ServerValidated(true));
    assert_eq!(session.cache().map(|c| c.change_depth()), Some(5));

    session.search().unwrap();
    let Event::SearchResultsReady(meetings) = next(&mut rx).await.event else {
        panic!("expected search results");
    };
    assert_eq!(meetings.len(), 3);

    session.login("admin", "wrong").unwrap();
    let batch = take(&mut rx, 2).await;
    assert!(matches!(&batch[0].event, Event::ErrorOccurred(e) if e.kind == ErrorKind::Unauthorized));
    assert_eq!(batch[1].event, Event::LoginStateChanged(false));

    session.login("admin", "right").unwrap();
    assert_eq!(next(&mut rx).await.event, Event::LoginStateChanged(true));

    session.delete_meeting(42).unwrap();
    let batch = take(&mut rx, 2).await;
    assert!(matches!(&batch[0].event, Event::ErrorOccurred(e) if e.kind == ErrorKind::Unauthorized));
    assert_eq!(batch[1].event, Event::MeetingDeleted(false));

    assert_quiet(&mut rx).await;
    let metrics = session.gateway_metrics().unwrap();
    assert!(metrics.requests >= 10);
}

#[tokio::test]
async fn test_delivery_follows_completion_across_operation_kinds() {
    let root = MockRoot::with_reference_data(5).await;
    client("GetSearchResults")
        .and(wiremock::matchers::query_param("get_formats_only", "1"))
        .respond_with(json_response(json!({"formats": []})))
        .with_priority(1)
        .mount(&root.server)
        .await;
    client("GetSearchResults")
        .respond_with(json_response(json!([meeting(1, 2)])).set_delay(Duration::from_millis(400)))
        .mount(&root.server)
        .await;

    let (session, mut rx) = ready_session(&root).await;
    let search = session.search().unwrap();
    let formats = session.fetch_all_used_formats().unwrap();

    let first = next(&mut rx).await;
    let second = next(&mut rx).await;
    assert_eq!(first.context.operation, formats);
    assert!(matches!(first.event, Event::FormatSearchResultsReady { all_used: true, .. }));
    assert_eq!(second.context.operation, search);
    assert!(matches!(second.event, Event::SearchResultsReady(_)));
}

/// Observer that records whether two calls ever overlapped
#[derive(Debug, Default)]
struct OverlapProbe {
    busy: AtomicBool,
    overlapped: AtomicBool,
    results: AtomicUsize,
}

impl OverlapProbe {
    async fn enter(&self) {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.busy.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionObserver for OverlapProbe {
    async fn server_validated(&self, _ctx: NotificationContext, _valid: bool) {
        self.enter().await;
    }

    async fn error_occurred(&self, _ctx: NotificationContext, _error: BmltError) {
        self.enter().await;
    }

    async fn search_results_ready(&self, _ctx: NotificationContext, _meetings: Vec<MeetingNode>) {
        self.enter().await;
        self.results.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_observer_calls_never_overlap() {
    let root = MockRoot::with_reference_data(5).await;
    client("GetSearchResults")
        .respond_with(json_response(json!([meeting(1, 2)])))
        .mount(&root.server)
        .await;

    let probe = Arc::new(OverlapProbe::default());
    let session = Session::builder()
        .config(loopback_config())
        .observer(probe.clone())
        .connect(&root.uri());
    session.wait_ready().await.unwrap();

    for _ in 0..8 {
        session.search().unwrap();
    }
    tokio::time::timeout(Duration::from_secs(5), async {
        while probe.results.load(Ordering::SeqCst) < 8 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("all searches delivered");

    assert!(!probe.overlapped.load(Ordering::SeqCst));
}
