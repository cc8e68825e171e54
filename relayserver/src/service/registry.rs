//! 방 레지스트리
//!
//! 방 이름 → 방 핸들 디렉토리입니다. 경계 계층에 명시적으로 주입되어 사용됩니다.
//! 이름 하나당 방과 루프는 최대 하나만 존재하며, 생성 여부 확인과 생성은 DashMap 엔트리 잠금 안에서 함께 일어납니다.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::info;

use crate::service::room::RoomHandle;

/// 방 레지스트리
pub struct RoomRegistry {
    rooms: DashMap<String, RoomHandle>,
    intake_capacity: usize,
    loops_started: AtomicU64,
}

impl RoomRegistry {
    /// 새 레지스트리를 만듭니다.
    ///
    /// # Arguments
    ///
    /// * `intake_capacity` - 새로 만드는 방의 요청 채널 용량
    pub fn new(intake_capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            intake_capacity,
            loops_started: AtomicU64::new(0),
        }
    }

    /// 이름에 해당하는 방을 반환하고, 없으면 만들고 루프를 시작합니다.
    ///
    /// 처음 보는 이름에 대한 동시 호출은 모두 같은 방 하나를 받습니다.
    pub fn get_or_create(&self, name: &str) -> RoomHandle {
        if let Some(room) = self.rooms.get(name) {
            return room.clone();
        }

        self.rooms
            .entry(name.to_string())
            .or_insert_with(|| {
                self.loops_started.fetch_add(1, Ordering::Relaxed);
                RoomHandle::spawn(name, self.intake_capacity)
            })
            .value()
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<RoomHandle> {
        self.rooms.get(name).map(|room| room.clone())
    }

    /// 현재 등록된 방 이름 (정렬됨)
    pub fn room_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.rooms.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// 지금까지 시작된 방 루프 수
    pub fn loops_started(&self) -> u64 {
        self.loops_started.load(Ordering::Relaxed)
    }

    /// 비어있는 방을 닫고 레지스트리에서 제거합니다.
    ///
    /// 닫힘 표시와 제거는 엔트리 잠금 안에서 함께 일어나므로,
    /// 경쟁하는 join은 방을 살려두거나 [`RoomClosed`](crate::tool::error::RelayError::RoomClosed)로 실패합니다.
    ///
    /// # Returns
    ///
    /// 제거된 방 이름
    pub async fn reap_idle(&self) -> Vec<String> {
        let candidates: Vec<String> = self
            .rooms
            .iter()
            .filter(|entry| entry.value().occupancy() == Some(0))
            .map(|entry| entry.key().clone())
            .collect();

        let mut reaped = Vec::new();
        for name in candidates {
            if let Some((name, room)) = self.rooms.remove_if(&name, |_, room| room.try_mark_closed()) {
                room.close().await;
                reaped.push(name);
            }
        }

        if !reaped.is_empty() {
            info!(count = reaped.len(), rooms = ?reaped, "🧹 빈 방 정리 완료");
        }
        reaped
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new(1024)
    }
}
