//! Versioned edits, change history, and contact messages.

mod common;

use bmlt_client::{Event, Session};
use bmlt_protocol::{
    ChangeListFilter, ChangeNode, ChangeSet, ChangeType, EditableMeetingNode, ErrorCode, ErrorKind,
};
use common::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

/// Ready session logged in with `Editor` on body 2 and `Observer` on body 3
async fn editor_session(root: &MockRoot) -> (Session, UnboundedReceiver<bmlt_client::Notification>) {
    root.mount_admin("admin", "right", &[(2, 2), (3, 1)]).await;
    let (session, mut rx) = ready_session(root).await;
    session.login("admin", "right").unwrap();
    assert_eq!(next(&mut rx).await.event, Event::LoginStateChanged(true));
    (session, rx)
}

fn history_for_meeting_10() -> serde_json::Value {
    let state = |name: &str| json!({"meeting_name": name, "service_body_bigint": "2"});
    json!([
        change(10, 10, 1_600_000_000, None, Some(state("A"))),
        change(30, 10, 1_600_000_300, Some(state("B")), Some(state("C"))),
        change(20, 10, 1_600_000_200, Some(state("A")), Some(state("B")))
    ])
}

#[tokio::test]
async fn test_commit_edit_returns_confirmed_values() {
    let root = MockRoot::with_reference_data(5).await;
    root.mount_meeting(10, 2).await;
    admin("modify_meeting")
        .and(query_param("meeting_id", "10"))
        .and(query_param("meeting_field[]", "meeting_name,Evening Group"))
        .respond_with(json_response(json!({
            "changeMeeting": {"id": "10"},
            "field": [{"key": "meeting_name", "oldValue": "Meeting 10", "newValue": "Evening Group"}]
        })))
        .expect(1)
        .mount(&root.server)
        .await;

    let (session, mut rx) = editor_session(&root).await;
    session
        .commit_edit(10, ChangeSet::new().with("meeting_name", "Evening Group"))
        .unwrap();

    let Event::MeetingEditCommitted(Some(changed)) = next(&mut rx).await.event else {
        panic!("expected a committed edit");
    };
    assert_eq!(changed.meeting_id, 10);
    assert_eq!(changed.new_values().get("meeting_name"), Some(&"Evening Group"));
}

#[tokio::test]
async fn test_commit_with_unknown_key_is_rejected_locally() {
    let root = MockRoot::with_reference_data(5).await;
    admin("modify_meeting")
        .respond_with(json_response(json!({})))
        .expect(0)
        .mount(&root.server)
        .await;

    let (session, mut rx) = editor_session(&root).await;
    session
        .commit_edit(10, ChangeSet::new().with("not_a_real_key", "x"))
        .unwrap();

    let batch = take(&mut rx, 2).await;
    assert!(matches!(&batch[0].event, Event::ErrorOccurred(e)
        if e.kind == ErrorKind::ValidationRejected && e.message.contains("not_a_real_key")));
    assert_eq!(batch[1].event, Event::MeetingEditCommitted(None));
}

#[tokio::test]
async fn test_edits_require_login() {
    let root = MockRoot::with_reference_data(5).await;
    let (session, mut rx) = ready_session(&root).await;

    session.delete_meeting(10).unwrap();
    let batch = take(&mut rx, 2).await;
    assert!(matches!(&batch[0].event, Event::ErrorOccurred(e) if e.kind == ErrorKind::Unauthorized));
    assert_eq!(batch[1].event, Event::MeetingDeleted(false));
}

#[tokio::test]
async fn test_delete_checks_privilege_per_service_body() {
    let root = MockRoot::with_reference_data(5).await;
    root.mount_meeting(10, 2).await;
    root.mount_meeting(11, 3).await;
    admin("delete_meeting")
        .and(query_param("meeting_id", "10"))
        .respond_with(json_response(json!({"meeting_id": "10"})))
        .expect(1)
        .mount(&root.server)
        .await;
    admin("delete_meeting")
        .and(query_param("meeting_id", "11"))
        .respond_with(json_response(json!({"meeting_id": "11"})))
        .expect(0)
        .mount(&root.server)
        .await;

    let (session, mut rx) = editor_session(&root).await;

    session.delete_meeting(10).unwrap();
    assert_eq!(next(&mut rx).await.event, Event::MeetingDeleted(true));

    // Observer only on body 3
    session.delete_meeting(11).unwrap();
    let batch = take(&mut rx, 2).await;
    assert!(matches!(&batch[0].event, Event::ErrorOccurred(e) if e.kind == ErrorKind::Unauthorized));
    assert_eq!(batch[1].event, Event::MeetingDeleted(false));
}

#[tokio::test]
async fn test_add_meeting_and_save_as_copy() {
    let root = MockRoot::with_reference_data(5).await;
    root.mount_meeting(55, 2).await;
    root.mount_meeting(56, 2).await;
    admin("add_meeting")
        .and(query_param("meeting_field[]", "published,0"))
        .respond_with(json_response(json!({"newMeeting": {"id": "56"}})))
        .with_priority(1)
        .expect(1)
        .mount(&root.server)
        .await;
    admin("add_meeting")
        .and(query_param("meeting_field[]", "meeting_name,New Group"))
        .respond_with(json_response(json!({"newMeeting": {"id": "55"}})))
        .expect(1)
        .mount(&root.server)
        .await;

    let (session, mut rx) = editor_session(&root).await;

    let mut draft = EditableMeetingNode::blank(2);
    draft.set("meeting_name", "New Group").set("weekday_tinyint", "3");
    session.add_meeting(draft).unwrap();
    let Event::MeetingAdded(Some(added)) = next(&mut rx).await.event else {
        panic!("expected an added meeting");
    };
    assert_eq!(added.id, 55);

    session.save_meeting_as_copy(EditableMeetingNode::new(added)).unwrap();
    let Event::MeetingAdded(Some(copy)) = next(&mut rx).await.event else {
        panic!("expected the copy");
    };
    assert_eq!(copy.id, 56);
}

#[tokio::test]
async fn test_add_meeting_without_service_body_is_rejected() {
    let root = MockRoot::with_reference_data(5).await;
    admin("add_meeting")
        .respond_with(json_response(json!({})))
        .expect(0)
        .mount(&root.server)
        .await;

    let (session, mut rx) = editor_session(&root).await;
    let mut draft = EditableMeetingNode::blank(0);
    draft.set("meeting_name", "Orphan");
    session.add_meeting(draft).unwrap();

    let batch = take(&mut rx, 2).await;
    assert!(matches!(&batch[0].event, Event::ErrorOccurred(e) if e.kind == ErrorKind::ValidationRejected));
    assert_eq!(batch[1].event, Event::MeetingAdded(None));
}

#[tokio::test]
async fn test_change_list_is_newest_first() {
    let root = MockRoot::with_reference_data(5).await;
    admin("get_changes")
        .and(query_param("meeting_id", "10"))
        .respond_with(json_response(history_for_meeting_10()))
        .mount(&root.server)
        .await;

    let (session, mut rx) = editor_session(&root).await;
    session.fetch_change_list(ChangeListFilter::for_meeting(10)).unwrap();

    let Event::ChangeListReady(changes) = next(&mut rx).await.event else {
        panic!("expected a change list");
    };
    let ids: Vec<u64> = changes.iter().map(|c| c.change_id).collect();
    assert_eq!(ids, vec![30, 20, 10]);
    assert_eq!(changes[2].change_type, ChangeType::Add);
    assert_eq!(changes[0].change_type, ChangeType::Edit);
}

/// Load the change list of meeting 10 and return it
async fn load_changes(session: &Session, rx: &mut UnboundedReceiver<bmlt_client::Notification>) -> Vec<ChangeNode> {
    session.fetch_change_list(ChangeListFilter::for_meeting(10)).unwrap();
    match next(rx).await.event {
        Event::ChangeListReady(changes) => changes,
        other => panic!("expected a change list, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rollback_beyond_change_depth_never_hits_the_server() {
    let root = MockRoot::with_reference_data(1).await;
    root.mount_meeting(10, 2).await;
    admin("get_changes")
        .and(query_param("meeting_id", "10"))
        .respond_with(json_response(history_for_meeting_10()))
        .mount(&root.server)
        .await;
    admin("rollback_meeting_to_before_change")
        .respond_with(json_response(json!({"meeting_id": "10"})))
        .expect(0)
        .mount(&root.server)
        .await;

    let (session, mut rx) = editor_session(&root).await;
    let changes = load_changes(&session, &mut rx).await;

    // Depth 1: only change 30 is reachable; 20 is one version too far
    session.rollback_meeting(10, changes[1].clone()).unwrap();
    let batch = take(&mut rx, 2).await;
    assert!(matches!(&batch[0].event, Event::ErrorOccurred(e) if e.kind == ErrorKind::NotFound));
    assert_eq!(batch[1].event, Event::MeetingRolledBack(None));
}

#[tokio::test]
async fn test_rollback_within_depth() {
    let root = MockRoot::with_reference_data(5).await;
    root.mount_meeting(10, 2).await;
    admin("get_changes")
        .and(query_param("meeting_id", "10"))
        .respond_with(json_response(history_for_meeting_10()))
        .expect(1)
        .mount(&root.server)
        .await;
    admin("rollback_meeting_to_before_change")
        .and(query_param("meeting_id", "10"))
        .and(query_param("change_id", "20"))
        .respond_with(json_response(json!({"meeting_id": "10"})))
        .expect(1)
        .mount(&root.server)
        .await;

    let (session, mut rx) = editor_session(&root).await;
    let changes = load_changes(&session, &mut rx).await;

    session.rollback_meeting(10, changes[1].clone()).unwrap();
    let Event::MeetingRolledBack(Some(restored)) = next(&mut rx).await.event else {
        panic!("expected the rolled back meeting");
    };
    assert_eq!(restored.id(), 10);
    assert!(!restored.has_changes());
}

#[tokio::test]
async fn test_rollback_checks_the_current_service_body() {
    let root = MockRoot::with_reference_data(5).await;
    // history was recorded under body 2; the meeting now lives in body 3
    root.mount_meeting(10, 3).await;
    admin("get_changes")
        .respond_with(json_response(history_for_meeting_10()))
        .mount(&root.server)
        .await;
    admin("rollback_meeting_to_before_change")
        .respond_with(json_response(json!({"meeting_id": "10"})))
        .expect(0)
        .mount(&root.server)
        .await;

    let (session, mut rx) = editor_session(&root).await;
    let changes = load_changes(&session, &mut rx).await;
    assert_eq!(changes[1].service_body_id, 2);

    session.rollback_meeting(10, changes[1].clone()).unwrap();
    let batch = take(&mut rx, 2).await;
    assert!(matches!(&batch[0].event, Event::ErrorOccurred(e) if e.kind == ErrorKind::Unauthorized));
    assert_eq!(batch[1].event, Event::MeetingRolledBack(None));
}

#[tokio::test]
async fn test_rollback_of_creation_is_rejected() {
    let root = MockRoot::with_reference_data(5).await;
    admin("get_changes")
        .respond_with(json_response(history_for_meeting_10()))
        .mount(&root.server)
        .await;

    let (session, mut rx) = editor_session(&root).await;
    let changes = load_changes(&session, &mut rx).await;

    session.rollback_meeting(10, changes[2].clone()).unwrap();
    let batch = take(&mut rx, 2).await;
    assert!(matches!(&batch[0].event, Event::ErrorOccurred(e) if e.kind == ErrorKind::ValidationRejected));
    assert_eq!(batch[1].event, Event::MeetingRolledBack(None));
}

#[tokio::test]
async fn test_deleted_meetings_and_restore() {
    let root = MockRoot::with_reference_data(5).await;
    let state = json!({"meeting_name": "Gone", "service_body_bigint": "2"});
    let mut deleted = change(40, 60, 1_600_000_400, Some(state.clone()), None);
    deleted["meeting_exists"] = json!("0");
    let mut restored_earlier = change(35, 61, 1_600_000_350, Some(state), None);
    restored_earlier["meeting_exists"] = json!("1");
    let history = json!([deleted, restored_earlier]);

    admin("get_changes")
        .respond_with(json_response(history))
        .mount(&root.server)
        .await;
    admin("restore_deleted_meeting")
        .and(query_param("meeting_id", "60"))
        .respond_with(json_response(json!({"meeting_id": "60"})))
        .expect(1)
        .mount(&root.server)
        .await;
    root.mount_meeting(60, 2).await;

    let (session, mut rx) = editor_session(&root).await;

    session.fetch_deleted_meetings(ChangeListFilter::default()).unwrap();
    let Event::DeletedMeetingsReady(gone) = next(&mut rx).await.event else {
        panic!("expected deleted meetings");
    };
    assert_eq!(gone.iter().map(|c| c.meeting_id).collect::<Vec<_>>(), vec![60]);

    session.restore_deleted_meeting(60).unwrap();
    let Event::MeetingAdded(Some(meeting)) = next(&mut rx).await.event else {
        panic!("expected the restored meeting");
    };
    assert_eq!(meeting.id, 60);
}

#[tokio::test]
async fn test_send_message_outcomes() {
    let root = MockRoot::with_reference_data(5).await;
    root.mount_meeting(10, 2).await;
    Mock::given(method("GET"))
        .and(path(CONTACT))
        .and(query_param("meeting_id", "10"))
        .and(query_param("service_body_id", "2"))
        .and(query_param("from_address", "me@example.org"))
        .respond_with(text_response("1"))
        .mount(&root.server)
        .await;
    Mock::given(method("GET"))
        .and(path(CONTACT))
        .and(query_param("from_address", "spammer@example.org"))
        .respond_with(text_response("-2"))
        .mount(&root.server)
        .await;

    let (session, mut rx) = editor_session(&root).await;

    session.send_message(10, "me@example.org", "Is this meeting still on?").unwrap();
    assert_eq!(next(&mut rx).await.event, Event::MessageSendCompleted(true));

    session.send_message(10, "spammer@example.org", "buy now").unwrap();
    let batch = take(&mut rx, 2).await;
    assert!(matches!(&batch[0].event, Event::ErrorOccurred(e) if e.code == ErrorCode::Spam));
    assert_eq!(batch[1].event, Event::MessageSendCompleted(false));
}

#[tokio::test]
async fn test_send_message_rejects_bad_sender_without_network() {
    let root = MockRoot::with_reference_data(5).await;
    Mock::given(method("GET"))
        .and(path(CONTACT))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&root.server)
        .await;

    let (session, mut rx) = editor_session(&root).await;
    session.send_message(10, "not-an-address", "hello").unwrap();

    let batch = take(&mut rx, 2).await;
    assert!(matches!(&batch[0].event, Event::ErrorOccurred(e)
        if e.kind == ErrorKind::ValidationRejected && e.code == ErrorCode::InvalidFrom));
    assert_eq!(batch[1].event, Event::MessageSendCompleted(false));
}
