use std::time::Duration;

use copresence_common::{events, Frame, Location, SessionError};
use serde_json::json;

use super::*;
use crate::identity::Identity;
use crate::registry::{PresenceRegistry, RegistryConfig};
use crate::testing::{eventually, Harness, RemoteEnd};

fn registry(idle_ms: u64) -> PresenceRegistry {
    PresenceRegistry::new(RegistryConfig {
        cursor_throttle: Duration::from_millis(50),
        idle_timeout: Duration::from_millis(idle_ms),
    })
}

fn session(h: &Harness, idle_ms: u64) -> PresenceSession {
    PresenceSession::new(
        h.client.clone(),
        registry(idle_ms),
        Identity::new("u1", "Ada").with_avatar("ada.png"),
    )
}

/// Enter `delivery:42` and consume the channel join plus the announce.
async fn enter(h: &Harness, session: &PresenceSession) -> RemoteEnd {
    session
        .enter(Location::delivery("42"), 1280.0, 800.0)
        .await
        .unwrap();
    let mut remote = h.next_remote().await;
    assert_eq!(
        remote.next_frame().await,
        Frame::Join {
            channel: "delivery:42".into()
        }
    );
    let (event, _) = remote.next_event().await;
    assert_eq!(event, events::JOIN);
    remote
}

#[tokio::test]
async fn enter_joins_channel_and_announces() {
    let h = Harness::new(0);
    let s = session(&h, 30_000);
    s.enter(Location::delivery("42"), 1280.0, 800.0).await.unwrap();
    assert_eq!(s.state(), SessionState::Active);

    let mut remote = h.next_remote().await;
    assert_eq!(
        remote.next_frame().await,
        Frame::Join {
            channel: "delivery:42".into()
        }
    );
    let (event, payload) = remote.next_event().await;
    assert_eq!(event, events::JOIN);
    assert_eq!(
        payload,
        json!({
            "user_id": "u1",
            "user_name": "Ada",
            "user_avatar": "ada.png",
            "page": "delivery",
            "page_id": "42",
            "cursor": { "x": 0.0, "y": 0.0, "viewport_width": 1280.0, "viewport_height": 800.0 }
        })
    );

    let me = s.registry().current_user().unwrap();
    assert_eq!(me.display_name, "Ada");
}

#[tokio::test]
async fn entering_twice_is_rejected() {
    let h = Harness::new(0);
    let s = session(&h, 30_000);
    let _remote = enter(&h, &s).await;
    let err = s.enter(Location::workspace(), 1.0, 1.0).await.unwrap_err();
    assert!(matches!(err, SessionError::AlreadyActive));
}

#[tokio::test]
async fn failed_enter_rolls_back() {
    let h = Harness::new(10);
    let s = session(&h, 30_000);
    let err = s
        .enter(Location::delivery("42"), 1280.0, 800.0)
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::Connect(_)));
    assert_eq!(s.state(), SessionState::Inactive);
    assert!(s.registry().is_empty());
    assert!(h.client.channels().is_empty());
    assert_eq!(h.client.listener_count(events::USER_JOINED), 0);
    assert_eq!(h.client.pending_len(), 0);
}

#[tokio::test]
async fn pointer_moves_are_throttled_before_sending() {
    let h = Harness::new(0);
    let s = session(&h, 30_000);
    let mut remote = enter(&h, &s).await;

    assert!(s.pointer_moved(120.0, 340.0));
    assert!(!s.pointer_moved(121.0, 341.0));

    let (event, payload) = remote.next_event().await;
    assert_eq!(event, events::CURSOR_MOVE);
    assert_eq!(
        payload,
        json!({
            "user_id": "u1",
            "page": "delivery",
            "page_id": "42",
            "x": 120.0,
            "y": 340.0,
            "viewport_width": 1280.0,
            "viewport_height": 800.0
        })
    );
    assert!(remote.is_quiet(Duration::from_millis(30)).await);

    tokio::time::sleep(Duration::from_millis(60)).await;
    s.resize_viewport(640.0, 400.0);
    assert!(s.pointer_moved(10.0, 20.0));
    let (_, payload) = remote.next_event().await;
    assert_eq!(payload["viewport_width"], 640.0);
}

#[tokio::test]
async fn input_requires_active_session() {
    let h = Harness::new(0);
    let s = session(&h, 30_000);
    assert!(!s.pointer_moved(1.0, 1.0));
    assert!(matches!(s.start_editing("x"), Err(SessionError::NotActive)));
    assert!(matches!(s.stop_editing(), Err(SessionError::NotActive)));
    assert!(matches!(
        s.navigate(Location::workspace()),
        Err(SessionError::NotActive)
    ));
    assert_eq!(h.opens(), 0);
}

#[tokio::test]
async fn editing_is_forwarded_with_item() {
    let h = Harness::new(0);
    let s = session(&h, 30_000);
    let mut remote = enter(&h, &s).await;

    s.start_editing("card-7").unwrap();
    let (event, payload) = remote.next_event().await;
    assert_eq!(event, events::EDITING);
    assert_eq!(payload["item_id"], "card-7");
    assert_eq!(payload["is_editing"], true);
    assert_eq!(
        s.registry().is_item_being_edited("card-7").unwrap().user_id,
        "u1"
    );

    s.stop_editing().unwrap();
    let (_, payload) = remote.next_event().await;
    assert_eq!(payload["item_id"], "card-7");
    assert_eq!(payload["is_editing"], false);
    assert!(s.registry().is_item_being_edited("card-7").is_none());

    // Nothing claimed, nothing sent.
    s.stop_editing().unwrap();
    assert!(remote.is_quiet(Duration::from_millis(30)).await);
}

#[tokio::test]
async fn navigate_sends_page_change() {
    let h = Harness::new(0);
    let s = session(&h, 30_000);
    let mut remote = enter(&h, &s).await;

    s.navigate(Location::service("billing")).unwrap();
    let (event, payload) = remote.next_event().await;
    assert_eq!(event, events::PAGE_CHANGE);
    assert_eq!(payload, json!({ "user_id": "u1", "page": "service", "page_id": "billing" }));
    assert_eq!(
        s.registry().current_user().unwrap().location,
        Location::service("billing")
    );
    assert_eq!(h.client.channels(), vec!["delivery:42".to_string()]);
}

#[tokio::test]
async fn inbound_events_drive_the_registry() {
    let h = Harness::new(0);
    let s = session(&h, 30_000);
    let remote = enter(&h, &s).await;
    let reg = s.registry().clone();

    remote
        .push(
            events::USERS_LIST,
            json!({ "users": [
                { "user_id": "u1", "user_name": "Overwritten?" },
                { "user_id": "u2", "user_name": "Bob", "page": "delivery", "page_id": "42" }
            ]}),
        )
        .await;
    eventually(|| reg.user("u2").is_some()).await;
    assert_eq!(reg.current_user().unwrap().display_name, "Ada");

    remote
        .push(
            events::CURSOR_MOVED,
            json!({ "user_id": "u2", "cursor": { "x": 5.0, "y": 6.0, "viewport_width": 100.0, "viewport_height": 50.0 } }),
        )
        .await;
    eventually(|| reg.user("u2").is_some_and(|u| u.cursor.x == 5.0)).await;

    remote
        .push(events::EDITING_CHANGED, json!({ "user_id": "u2", "item_id": "doc", "is_editing": true }))
        .await;
    eventually(|| reg.is_item_being_edited("doc").is_some()).await;

    remote
        .push(events::EDITING_CHANGED, json!({ "user_id": "u2", "is_editing": false }))
        .await;
    eventually(|| reg.is_item_being_edited("doc").is_none()).await;

    remote.push(events::USER_IDLE, json!({ "user_id": "u2" })).await;
    eventually(|| reg.user("u2").is_some_and(|u| u.is_idle)).await;

    remote.push(events::USER_LEFT, json!({ "user_id": "u2" })).await;
    eventually(|| reg.user("u2").is_none()).await;
    assert_eq!(reg.other_users().len(), 0);
}

#[tokio::test]
async fn events_about_self_and_malformed_payloads_are_ignored() {
    let h = Harness::new(0);
    let s = session(&h, 30_000);
    let remote = enter(&h, &s).await;
    let reg = s.registry().clone();

    remote.push(events::USER_LEFT, json!({ "user_id": "u1" })).await;
    remote.push(events::USER_JOINED, json!({ "nope": true })).await;
    remote.push(events::USER_JOINED, json!({ "user_id": "u1", "user_name": "Mallory" })).await;
    remote.push(events::USER_JOINED, json!({ "user_id": "u3", "user_name": "Cy" })).await;

    eventually(|| reg.user("u3").is_some()).await;
    let me = reg.current_user().unwrap();
    assert_eq!(me.display_name, "Ada");
    assert_eq!(reg.all_users().len(), 2);
}

#[tokio::test]
async fn leave_announces_and_cleans_up() {
    let h = Harness::new(0);
    let s = session(&h, 30_000);
    let mut remote = enter(&h, &s).await;
    remote
        .push(events::USER_JOINED, json!({ "user_id": "u2" }))
        .await;
    eventually(|| s.registry().user("u2").is_some()).await;

    s.leave();
    assert_eq!(s.state(), SessionState::Inactive);

    let (event, payload) = remote.next_event().await;
    assert_eq!(event, events::LEAVE);
    assert_eq!(payload["user_id"], "u1");
    assert_eq!(
        remote.next_frame().await,
        Frame::Leave {
            channel: "delivery:42".into()
        }
    );
    assert!(s.registry().is_empty());
    assert!(h.client.channels().is_empty());
    assert_eq!(h.client.listener_count(events::USER_JOINED), 0);
    assert_eq!(h.client.listener_count(events::CONNECTED), 0);

    // A fresh enter works after leaving.
    s.enter(Location::project("p1"), 1.0, 1.0).await.unwrap();
    assert_eq!(s.state(), SessionState::Active);
}

#[tokio::test]
async fn reconnect_clears_remote_and_rejoins() {
    let h = Harness::new(0);
    let s = session(&h, 30_000);
    let first = enter(&h, &s).await;
    first
        .push(events::USER_JOINED, json!({ "user_id": "u2" }))
        .await;
    eventually(|| s.registry().user("u2").is_some()).await;

    drop(first);
    let mut second = h.next_remote().await;
    assert_eq!(
        second.next_frame().await,
        Frame::Join {
            channel: "delivery:42".into()
        }
    );
    let (event, payload) = second.next_event().await;
    assert_eq!(event, events::JOIN);
    assert_eq!(payload["user_id"], "u1");

    assert!(s.registry().user("u2").is_none());
    assert!(s.registry().current_user().is_some());
    assert_eq!(s.state(), SessionState::Active);
}

#[tokio::test]
async fn local_idleness_is_declared_to_peers() {
    let h = Harness::new(0);
    let s = session(&h, 80);
    let mut remote = enter(&h, &s).await;

    let (event, payload) = remote.next_event().await;
    assert_eq!(event, events::IDLE);
    assert_eq!(payload, json!({ "user_id": "u1", "page": "delivery", "page_id": "42" }));
    assert!(s.registry().current_user().unwrap().is_idle);
}

#[tokio::test]
async fn drop_leaves() {
    let h = Harness::new(0);
    let s = session(&h, 30_000);
    let mut remote = enter(&h, &s).await;
    drop(s);

    let (event, _) = remote.next_event().await;
    assert_eq!(event, events::LEAVE);
    assert!(h.client.channels().is_empty());
}

#[tokio::test]
async fn leave_after_navigate_leaves_the_entered_channel() {
    let h = Harness::new(0);
    let s = session(&h, 30_000);
    let mut remote = enter(&h, &s).await;

    s.navigate(Location::service("billing")).unwrap();
    let (event, _) = remote.next_event().await;
    assert_eq!(event, events::PAGE_CHANGE);

    s.leave();
    let (event, payload) = remote.next_event().await;
    assert_eq!(event, events::LEAVE);
    assert_eq!(payload["page"], "service");
    assert_eq!(
        remote.next_frame().await,
        Frame::Leave {
            channel: "delivery:42".into()
        }
    );
    assert!(h.client.channels().is_empty());

    s.enter(Location::project("p1"), 1.0, 1.0).await.unwrap();
    assert_eq!(h.client.channels(), vec!["project:p1".to_string()]);
}

#[tokio::test]
async fn rejoin_after_navigate_keeps_the_entered_channel() {
    let h = Harness::new(0);
    let s = session(&h, 30_000);
    let mut first = enter(&h, &s).await;

    s.navigate(Location::service("billing")).unwrap();
    let (event, _) = first.next_event().await;
    assert_eq!(event, events::PAGE_CHANGE);

    drop(first);
    let mut second = h.next_remote().await;
    assert_eq!(
        second.next_frame().await,
        Frame::Join {
            channel: "delivery:42".into()
        }
    );
    let (event, payload) = second.next_event().await;
    assert_eq!(event, events::JOIN);
    assert_eq!(payload["page"], "service");
    assert_eq!(payload["page_id"], "billing");
    assert_eq!(payload["channel"], "delivery:42");
    assert_eq!(h.client.channels(), vec!["delivery:42".to_string()]);
}
