//! 방 서비스
//!
//! 하나의 이름 있는 방과 그 멤버 집합을 소유하는 단일 루프입니다.
//! join/leave/broadcast 요청은 모두 intake 채널로 들어오고, 루프가 도착 순서대로 하나씩 적용합니다.
//! 멤버 집합은 루프만 읽고 쓰므로 잠금이 필요 없습니다.
//!
//! # 백프레셔 정책
//!
//! 브로드캐스트는 각 멤버의 송신 큐에 `try_send`로만 넣습니다.
//! 큐가 가득 찬 멤버는 기다리지 않고 같은 단계에서 퇴출(큐 닫기 + 집합에서 제거)됩니다.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::tool::error::{RelayError, RelayResult};

/// 닫힌 방의 occupancy 표식
const CLOSED: usize = usize::MAX;

static NEXT_MEMBER_ID: AtomicU64 = AtomicU64::new(1);

/// 프로세스 안에서 유일한 멤버 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberId(u64);

impl MemberId {
    /// 새 멤버 ID를 할당합니다.
    pub fn next() -> Self {
        MemberId(NEXT_MEMBER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// 방 루프가 보관하는 멤버 정보
///
/// `outbound`는 멤버 송신 큐의 유일한 sender입니다. 이 값을 drop하는 것이 곧 큐를 닫는 것입니다.
/// `evict`는 퇴출 시 취소되어 멤버의 두 펌프를 모두 멈춥니다.
#[derive(Debug)]
pub struct MemberSlot {
    pub id: MemberId,
    pub identity: Arc<str>,
    pub outbound: mpsc::Sender<Bytes>,
    pub evict: CancellationToken,
}

/// 방 루프로 보내는 요청
#[derive(Debug)]
enum RoomCommand {
    Join(MemberSlot),
    Leave(MemberId),
    Broadcast(Bytes),
    Snapshot(oneshot::Sender<RoomSnapshot>),
    Close,
}

/// 방 멤버 요약
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSummary {
    pub id: MemberId,
    pub identity: String,
}

/// 방 상태 스냅샷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub name: String,
    /// ID 순으로 정렬된 현재 멤버
    pub members: Vec<MemberSummary>,
    pub broadcasts: u64,
    pub deliveries: u64,
    pub evictions: u64,
    pub created_at: i64,
}

impl RoomSnapshot {
    pub fn member_ids(&self) -> Vec<MemberId> {
        self.members.iter().map(|m| m.id).collect()
    }

    pub fn contains(&self, id: MemberId) -> bool {
        self.members.iter().any(|m| m.id == id)
    }
}

/// 방 핸들
///
/// 방과의 모든 상호작용은 이 핸들을 통해 요청 메시지로 전달됩니다.
#[derive(Clone)]
pub struct RoomHandle {
    name: Arc<str>,
    intake: mpsc::Sender<RoomCommand>,
    /// 가입된 멤버 수 + 아직 적용되지 않은 join 수. 닫히면 [`CLOSED`].
    occupancy: Arc<AtomicUsize>,
}

impl fmt::Debug for RoomHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomHandle")
            .field("name", &self.name)
            .field("occupancy", &self.occupancy.load(Ordering::Relaxed))
            .finish()
    }
}

impl RoomHandle {
    /// 새 방을 만들고 루프를 시작합니다.
    ///
    /// tokio 런타임 안에서 호출해야 합니다. 같은 이름의 방이 하나만 존재하도록 하는 것은
    /// [`RoomRegistry`](crate::service::registry::RoomRegistry)의 책임입니다.
    pub fn spawn(name: &str, intake_capacity: usize) -> RoomHandle {
        let (intake_tx, intake_rx) = mpsc::channel(intake_capacity.max(1));
        let occupancy = Arc::new(AtomicUsize::new(0));
        let name: Arc<str> = Arc::from(name);

        let room_loop = RoomLoop {
            name: name.clone(),
            members: HashMap::new(),
            occupancy: occupancy.clone(),
            broadcasts: 0,
            deliveries: 0,
            evictions: 0,
            created_at: chrono::Utc::now().timestamp(),
        };
        tokio::spawn(room_loop.run(intake_rx));
        info!(room = %name, "🏠 방 생성 및 루프 시작");

        RoomHandle {
            name,
            intake: intake_tx,
            occupancy,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 두 핸들이 같은 방을 가리키는지 확인합니다.
    pub fn same_room(&self, other: &RoomHandle) -> bool {
        Arc::ptr_eq(&self.occupancy, &other.occupancy)
    }

    /// 가입 멤버와 대기 중인 join 수. 닫힌 방이면 `None`.
    pub fn occupancy(&self) -> Option<usize> {
        match self.occupancy.load(Ordering::Acquire) {
            CLOSED => None,
            n => Some(n),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.occupancy().is_none()
    }

    /// 멤버를 방에 추가합니다.
    ///
    /// 닫힌 방이면 [`RelayError::RoomClosed`]를 반환합니다.
    pub async fn join(&self, slot: MemberSlot) -> RelayResult<()> {
        self.occupancy
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                if n == CLOSED {
                    None
                } else {
                    Some(n + 1)
                }
            })
            .map_err(|_| self.closed_error())?;

        self.intake
            .send(RoomCommand::Join(slot))
            .await
            .map_err(|_| self.closed_error())
    }

    /// 멤버를 방에서 제거합니다. 없는 멤버이거나 방이 닫혔으면 아무 일도 하지 않습니다.
    pub async fn leave(&self, id: MemberId) {
        if self.intake.send(RoomCommand::Leave(id)).await.is_err() {
            debug!(room = %self.name, member = %id, "닫힌 방에 대한 leave 무시");
        }
    }

    /// 현재 가입된 모든 멤버에게 payload를 전달하도록 요청합니다.
    pub async fn broadcast(&self, payload: Bytes) -> RelayResult<()> {
        self.intake
            .send(RoomCommand::Broadcast(payload))
            .await
            .map_err(|_| self.closed_error())
    }

    /// 방 상태 스냅샷을 조회합니다.
    ///
    /// 앞서 보낸 요청들이 모두 적용된 뒤의 상태가 반환됩니다.
    pub async fn snapshot(&self) -> RelayResult<RoomSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.intake
            .send(RoomCommand::Snapshot(reply_tx))
            .await
            .map_err(|_| self.closed_error())?;
        reply_rx.await.map_err(|_| self.closed_error())
    }

    /// 비어있는 방을 닫힌 상태로 표시합니다.
    ///
    /// occupancy가 0일 때만 성공하며, 성공한 뒤에는 어떤 join도 받아들이지 않습니다.
    pub(crate) fn try_mark_closed(&self) -> bool {
        self.occupancy
            .compare_exchange(0, CLOSED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 루프를 종료합니다. [`try_mark_closed`](Self::try_mark_closed)가 성공한 뒤에만 호출합니다.
    pub(crate) async fn close(&self) {
        let _ = self.intake.send(RoomCommand::Close).await;
    }

    fn closed_error(&self) -> RelayError {
        RelayError::RoomClosed {
            room: self.name.to_string(),
        }
    }
}

/// 방 루프 상태. 이 구조체는 루프 태스크만 소유합니다.
struct RoomLoop {
    name: Arc<str>,
    members: HashMap<MemberId, MemberSlot>,
    occupancy: Arc<AtomicUsize>,
    broadcasts: u64,
    deliveries: u64,
    evictions: u64,
    created_at: i64,
}

impl RoomLoop {
    async fn run(mut self, mut intake: mpsc::Receiver<RoomCommand>) {
        while let Some(command) = intake.recv().await {
            match command {
                RoomCommand::Join(slot) => self.join(slot),
                RoomCommand::Leave(id) => self.leave(id),
                RoomCommand::Broadcast(payload) => self.broadcast(payload),
                RoomCommand::Snapshot(reply) => {
                    let _ = reply.send(self.snapshot());
                }
                RoomCommand::Close => break,
            }
        }
        info!(room = %self.name, "방 루프 종료");
    }

    fn join(&mut self, slot: MemberSlot) {
        debug!(room = %self.name, member = %slot.id, identity = %slot.identity, "멤버 입장");
        if self.members.insert(slot.id, slot).is_some() {
            // 같은 멤버의 중복 join은 기존 항목을 대체
            self.release(1);
        }
    }

    fn leave(&mut self, id: MemberId) {
        if let Some(slot) = self.members.remove(&id) {
            debug!(room = %self.name, member = %id, identity = %slot.identity, "멤버 퇴장");
            self.release(1);
        }
    }

    fn broadcast(&mut self, payload: Bytes) {
        self.broadcasts += 1;

        let name = &self.name;
        let mut delivered = 0u64;
        let mut evicted = 0u64;
        let before = self.members.len();

        self.members.retain(|id, slot| match slot.outbound.try_send(payload.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(room = %name, member = %id, identity = %slot.identity, "송신 큐 가득 참, 느린 멤버 퇴출");
                // 멈춘 쓰기와 수신 펌프까지 함께 종료
                slot.evict.cancel();
                evicted += 1;
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(room = %name, member = %id, "송신 측이 이미 종료된 멤버 제거");
                false
            }
        });

        self.deliveries += delivered;
        self.evictions += evicted;
        let removed = before - self.members.len();
        if removed > 0 {
            self.release(removed);
        }
    }

    fn snapshot(&self) -> RoomSnapshot {
        let mut members: Vec<MemberSummary> = self
            .members
            .values()
            .map(|slot| MemberSummary {
                id: slot.id,
                identity: slot.identity.to_string(),
            })
            .collect();
        members.sort_by_key(|m| m.id);

        RoomSnapshot {
            name: self.name.to_string(),
            members,
            broadcasts: self.broadcasts,
            deliveries: self.deliveries,
            evictions: self.evictions,
            created_at: self.created_at,
        }
    }

    fn release(&self, count: usize) {
        self.occupancy.fetch_sub(count, Ordering::AcqRel);
    }
}
