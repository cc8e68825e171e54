//! 릴레이 서버 부하 테스트
//!
//! 여러 방에 여러 멤버를 배치하고 모든 멤버가 동시에 메시지를 보냅니다.
//! 각 멤버는 자기 방의 모든 메시지를 받아야 하며, 보낸 사람별 순서가 유지되어야 합니다.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::info;

use relayserver::{ConnectionHandler, JoinParams, MemoryEndpoint, PumpOptions, RoomRegistry};

const ROOMS: usize = 10;
const MEMBERS_PER_ROOM: usize = 8;
const MESSAGES_PER_MEMBER: usize = 20;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_rooms_concurrent_broadcast() {
    let registry = Arc::new(RoomRegistry::new(1024));
    let handler = ConnectionHandler::new(registry.clone(), 256, PumpOptions::default());

    let mut peers = Vec::new();
    for room in 0..ROOMS {
        for member in 0..MEMBERS_PER_ROOM {
            let identity = format!("user{}", member);
            let room_name = format!("room{}", room);
            let params =
                JoinParams::from_parts(Some(room_name.clone()), Some(identity.clone())).unwrap();
            let (endpoint, peer) = MemoryEndpoint::pair(identity, 1024);
            let handler = handler.clone();
            tokio::spawn(async move { handler.handle(params, endpoint).await });
            peers.push((room_name, peer));
        }
    }

    // 모든 멤버가 입장할 때까지 대기
    timeout(Duration::from_secs(5), async {
        loop {
            let mut joined = 0;
            for name in registry.room_names() {
                if let Some(room) = registry.get(&name) {
                    joined += room.snapshot().await.map(|s| s.members.len()).unwrap_or(0);
                }
            }
            if joined == ROOMS * MEMBERS_PER_ROOM {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("모든 멤버가 입장해야 함");

    assert_eq!(registry.room_count(), ROOMS);
    assert_eq!(registry.loops_started() as usize, ROOMS);

    for (_, peer) in &peers {
        for i in 0..MESSAGES_PER_MEMBER {
            assert!(peer.send(format!("{}", i)));
        }
    }

    let expected = MEMBERS_PER_ROOM * MESSAGES_PER_MEMBER;
    let mut receivers = Vec::new();
    for (room, mut peer) in peers {
        receivers.push(tokio::spawn(async move {
            let mut last_seen: HashMap<String, i64> = HashMap::new();
            for _ in 0..expected {
                let message = timeout(Duration::from_secs(5), peer.recv())
                    .await
                    .expect("메시지 수신 시간 초과")
                    .expect("연결이 닫힘");
                let text = String::from_utf8(message.to_vec()).unwrap();
                let (sender, seq) = text.split_once(": ").unwrap();
                let seq: i64 = seq.parse().unwrap();
                let previous = last_seen.insert(sender.to_string(), seq).unwrap_or(-1);
                assert_eq!(seq, previous + 1, "보낸 사람별 순서가 유지되어야 함");
            }
            room
        }));
    }

    for receiver in receivers {
        receiver.await.unwrap();
    }

    let mut total_deliveries = 0;
    for name in registry.room_names() {
        let snapshot = registry.get(&name).unwrap().snapshot().await.unwrap();
        assert_eq!(snapshot.evictions, 0);
        total_deliveries += snapshot.deliveries;
    }
    info!("총 전달 수: {}", total_deliveries);
    assert_eq!(
        total_deliveries as usize,
        ROOMS * MEMBERS_PER_ROOM * expected
    );
}
