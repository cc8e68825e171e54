//! 릴레이 통합 테스트
//!
//! 프로세스 내부 엔드포인트로 연결 핸들러부터 방 루프까지 전체 흐름을 검증합니다:
//! 1. alice와 bob이 lobby에 입장
//! 2. alice가 보낸 메시지가 "alice: hi" 형식으로 bob에게 전달
//! 3. bob의 전송 실패 후에도 alice는 계속 메시지를 보낼 수 있음

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};

use relayserver::{
    ConnectionHandler, JoinParams, MemberReport, MemoryEndpoint, MemoryPeer, PumpOptions,
    RelayResult, RoomRegistry, StopReason,
};

const WAIT: Duration = Duration::from_secs(2);

struct TestClient {
    peer: MemoryPeer,
    task: JoinHandle<RelayResult<MemberReport>>,
}

fn params(room: &str, identity: &str) -> JoinParams {
    JoinParams::from_parts(Some(room.to_string()), Some(identity.to_string())).unwrap()
}

fn connect(handler: &ConnectionHandler, room: &str, identity: &str, write_buffer: usize) -> TestClient {
    let (endpoint, peer) = MemoryEndpoint::pair(identity, write_buffer);
    let handler = handler.clone();
    let params = params(room, identity);
    let task = tokio::spawn(async move { handler.handle(params, endpoint).await });
    TestClient { peer, task }
}

/// 방 멤버 수가 기대값이 될 때까지 기다립니다.
async fn wait_for_members(registry: &RoomRegistry, room: &str, expected: usize) {
    timeout(WAIT, async {
        loop {
            if let Some(handle) = registry.get(room) {
                if let Ok(snapshot) = handle.snapshot().await {
                    if snapshot.members.len() == expected {
                        return;
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("멤버 수가 기대값에 도달하지 않음");
}

async fn recv(peer: &mut MemoryPeer) -> Option<Bytes> {
    timeout(WAIT, peer.recv()).await.expect("메시지 수신 시간 초과")
}

#[tokio::test]
async fn test_alice_and_bob_in_lobby() {
    let registry = Arc::new(RoomRegistry::new(64));
    let handler = ConnectionHandler::new(registry.clone(), 256, PumpOptions::default());

    let mut alice = connect(&handler, "lobby", "alice", 16);
    let mut bob = connect(&handler, "lobby", "bob", 16);
    wait_for_members(&registry, "lobby", 2).await;

    assert!(alice.peer.send("hi"));
    assert_eq!(recv(&mut bob.peer).await.unwrap(), "alice: hi");
    assert_eq!(recv(&mut alice.peer).await.unwrap(), "alice: hi");

    // bob 전송 실패
    bob.peer.fail("connection reset by peer");
    let report = assert_ok!(timeout(WAIT, bob.task).await.unwrap().unwrap());
    assert!(matches!(report.inbound, StopReason::TransportFailed(_)));
    wait_for_members(&registry, "lobby", 1).await;

    assert!(alice.peer.send("still there?"));
    assert_eq!(recv(&mut alice.peer).await.unwrap(), "alice: still there?");
    assert_eq!(recv(&mut bob.peer).await, None, "끊긴 bob에게는 아무것도 전달되지 않아야 함");

    let snapshot = registry.get("lobby").unwrap().snapshot().await.unwrap();
    assert_eq!(snapshot.broadcasts, 2);
    assert_eq!(snapshot.members[0].identity, "alice");

    alice.peer.hang_up();
    assert_ok!(timeout(WAIT, alice.task).await.unwrap().unwrap());
}

#[tokio::test]
async fn test_rooms_are_isolated() {
    let registry = Arc::new(RoomRegistry::new(64));
    let handler = ConnectionHandler::new(registry.clone(), 256, PumpOptions::default());

    let mut alice = connect(&handler, "lobby", "alice", 16);
    let mut carol = connect(&handler, "games", "carol", 16);
    wait_for_members(&registry, "lobby", 1).await;
    wait_for_members(&registry, "games", 1).await;

    assert!(alice.peer.send("hello lobby"));
    assert_eq!(recv(&mut alice.peer).await.unwrap(), "alice: hello lobby");

    // games 방에는 아무것도 오지 않음
    let snapshot = registry.get("games").unwrap().snapshot().await.unwrap();
    assert_eq!(snapshot.broadcasts, 0);
    assert!(carol.peer.try_recv().is_none());
}

#[tokio::test]
async fn test_slow_consumer_does_not_stall_room() {
    let registry = Arc::new(RoomRegistry::new(1024));
    let options = PumpOptions {
        idle_timeout: None,
        write_timeout: Some(Duration::from_millis(200)),
    };
    let handler = ConnectionHandler::new(registry.clone(), 256, options);

    // 전혀 읽지 않는 클라이언트
    let slow = connect(&handler, "lobby", "slow", 1);
    let mut fast = connect(&handler, "lobby", "fast", 1024);
    let sender = connect(&handler, "lobby", "sender", 1024);
    wait_for_members(&registry, "lobby", 3).await;

    for i in 0..300 {
        assert!(sender.peer.send(format!("{}", i)));
    }

    for i in 0..300 {
        assert_eq!(recv(&mut fast.peer).await.unwrap(), format!("sender: {}", i));
    }

    let report = assert_ok!(timeout(WAIT, slow.task).await.unwrap().unwrap());
    assert_eq!(report.identity, "slow");

    let snapshot = registry.get("lobby").unwrap().snapshot().await.unwrap();
    assert_eq!(snapshot.evictions, 1);
    assert_eq!(snapshot.members.len(), 2);
}

#[tokio::test]
async fn test_connection_after_reap_gets_fresh_room() {
    let registry = Arc::new(RoomRegistry::new(64));
    let handler = ConnectionHandler::new(registry.clone(), 256, PumpOptions::default());

    let mut first = connect(&handler, "lobby", "alice", 16);
    wait_for_members(&registry, "lobby", 1).await;
    let old_room = registry.get("lobby").unwrap();

    first.peer.hang_up();
    assert_ok!(timeout(WAIT, first.task).await.unwrap().unwrap());
    assert_eq!(registry.reap_idle().await, vec!["lobby".to_string()]);
    assert!(old_room.is_closed());
    assert_err!(old_room.snapshot().await);

    let mut second = connect(&handler, "lobby", "bob", 16);
    wait_for_members(&registry, "lobby", 1).await;
    assert!(!registry.get("lobby").unwrap().same_room(&old_room));

    assert!(second.peer.send("new room"));
    assert_eq!(recv(&mut second.peer).await.unwrap(), "bob: new room");
    assert_eq!(registry.loops_started(), 2);
}
