mod support;

use reqwest::StatusCode;
use serde_json::{json, Value};

use support::{received, spawn_server, spawn_server_with, status, typing};

#[tokio::test]
async fn message_reaches_every_member_and_nobody_else() {
    let server = spawn_server().await;
    let alice = server.user_token("alice").await;
    let bob = server.user_token("bob").await;
    let carol = server.user_token("carol").await;
    let room = server.create_room(&alice, "general").await;

    let mut a = server.connect(Some(&alice)).await;
    let mut b = server.connect(Some(&bob)).await;
    let mut c = server.connect(Some(&carol)).await;

    a.join(&room).await;
    assert_eq!(a.recv().await, status("alice joined the room"));
    b.join(&room).await;
    assert_eq!(a.recv().await, status("bob joined the room"));
    assert_eq!(b.recv().await, status("bob joined the room"));

    a.send("send_message", json!({ "room": room, "message": "hi" }))
        .await;
    assert_eq!(a.recv().await, received("alice", "hi"));
    assert_eq!(b.recv().await, received("alice", "hi"));
    c.expect_silence().await;

    let history: Vec<Value> = server
        .get(&carol, &format!("/rooms/{room}/messages"))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["username"], "alice");
    assert_eq!(history[0]["message"], "hi");
}

#[tokio::test]
async fn messages_arrive_in_send_order() {
    let server = spawn_server().await;
    let alice = server.user_token("alice").await;
    let room = server.create_room(&alice, "general").await;

    let mut a = server.connect(Some(&alice)).await;
    a.join(&room).await;
    a.recv().await;

    for text in ["one", "two", "three"] {
        a.send("send_message", json!({ "room": room, "message": text }))
            .await;
    }
    for text in ["one", "two", "three"] {
        assert_eq!(a.recv().await, received("alice", text));
    }

    let history: Vec<Value> = server
        .get(&alice, &format!("/rooms/{room}/messages"))
        .await
        .json()
        .await
        .unwrap();
    let texts: Vec<_> = history.iter().map(|m| m["message"].clone()).collect();
    assert_eq!(texts, vec![json!("one"), json!("two"), json!("three")]);
}

#[tokio::test]
async fn typing_skips_the_sender() {
    let server = spawn_server().await;
    let alice = server.user_token("alice").await;
    let bob = server.user_token("bob").await;
    let room = server.create_room(&alice, "general").await;

    let mut a = server.connect(Some(&alice)).await;
    let mut b = server.connect(Some(&bob)).await;
    a.join(&room).await;
    a.recv().await;
    b.join(&room).await;
    a.recv().await;
    b.recv().await;

    a.send("typing", json!({ "room": room })).await;
    assert_eq!(b.recv().await, typing("alice"));
    a.expect_silence().await;
}

#[tokio::test]
async fn message_to_unknown_room_is_dropped() {
    let server = spawn_server().await;
    let alice = server.user_token("alice").await;

    let mut a = server.connect(Some(&alice)).await;
    a.join("Nope1234").await;
    assert_eq!(a.recv().await, status("alice joined the room"));

    a.send("send_message", json!({ "room": "Nope1234", "message": "hello?" }))
        .await;
    a.expect_silence().await;

    let response = server.get(&alice, "/rooms/Nope1234/messages").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn blank_message_is_dropped() {
    let server = spawn_server().await;
    let alice = server.user_token("alice").await;
    let room = server.create_room(&alice, "general").await;

    let mut a = server.connect(Some(&alice)).await;
    a.join(&room).await;
    a.recv().await;

    a.send("send_message", json!({ "room": room, "message": "   " }))
        .await;
    a.expect_silence().await;
}

#[tokio::test]
async fn events_without_a_session_are_dropped() {
    let server = spawn_server().await;
    let alice = server.user_token("alice").await;
    let room = server.create_room(&alice, "general").await;

    let mut a = server.connect(Some(&alice)).await;
    a.join(&room).await;
    a.recv().await;

    let mut anonymous = server.connect(None).await;
    anonymous.join(&room).await;
    anonymous
        .send("send_message", json!({ "room": room, "message": "spam" }))
        .await;

    let mut forged = server.connect(Some("not-a-token")).await;
    forged.join(&room).await;

    anonymous.expect_silence().await;
    forged.expect_silence().await;
    a.expect_silence().await;
}

#[tokio::test]
async fn logout_revokes_realtime_identity() {
    let server = spawn_server().await;
    let alice = server.user_token("alice").await;
    let room = server.create_room(&alice, "general").await;

    let mut a = server.connect(Some(&alice)).await;
    let response = server.post(&alice, "/auth/logout", json!({})).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    a.join(&room).await;
    a.expect_silence().await;
}

#[tokio::test]
async fn leave_and_disconnect_notify_remaining_members() {
    let server = spawn_server().await;
    let alice = server.user_token("alice").await;
    let bob = server.user_token("bob").await;
    let room = server.create_room(&alice, "general").await;

    let mut a = server.connect(Some(&alice)).await;
    let mut b = server.connect(Some(&bob)).await;
    a.join(&room).await;
    a.recv().await;
    b.join(&room).await;
    a.recv().await;
    b.recv().await;

    b.send("leave", json!({ "room": room })).await;
    assert_eq!(a.recv().await, status("bob left the room"));
    b.expect_silence().await;

    // 已离开的成员收不到房间消息
    a.send("send_message", json!({ "room": room, "message": "still here" }))
        .await;
    assert_eq!(a.recv().await, received("alice", "still here"));
    b.expect_silence().await;

    b.join(&room).await;
    assert_eq!(a.recv().await, status("bob joined the room"));
    b.recv().await;

    b.close().await;
    assert_eq!(a.recv().await, status("bob left the room"));

    let detail: Value = server
        .get(&alice, &format!("/rooms/{room}"))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(detail["online"], 1);
}

#[tokio::test]
async fn malformed_frames_do_not_close_the_connection() {
    let server = spawn_server().await;
    let alice = server.user_token("alice").await;
    let room = server.create_room(&alice, "general").await;

    let mut a = server.connect(Some(&alice)).await;
    a.send_raw("not json").await;
    a.send("shout", json!({ "room": room })).await;
    a.send("join", json!({ "room": "bad code!" })).await;
    a.expect_silence().await;

    a.join(&room).await;
    assert_eq!(a.recv().await, status("alice joined the room"));
}

#[tokio::test]
async fn strict_join_rejects_unknown_rooms() {
    let server = spawn_server_with("[realtime]\nstrict_join = true").await;
    let alice = server.user_token("alice").await;
    let room = server.create_room(&alice, "general").await;

    let mut a = server.connect(Some(&alice)).await;
    a.join("Nope1234").await;
    a.expect_silence().await;

    a.join(&room).await;
    assert_eq!(a.recv().await, status("alice joined the room"));
}
