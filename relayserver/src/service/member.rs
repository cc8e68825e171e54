//! 멤버 서비스
//!
//! 연결 하나당 멤버 하나가 만들어지고, 서로 독립적인 두 펌프 태스크가 연결을 구동합니다.
//!
//! ```text
//!            read_frame                 broadcast
//! 클라이언트 ──────────> 수신 펌프 ──────────────> 방 루프
//!                                                  │ try_send
//! 클라이언트 <────────── 송신 펌프 <── 송신 큐 <───┘
//!            write_frame
//! ```
//!
//! 두 펌프는 [`CancellationToken`]을 공유합니다. 어느 쪽이든 종료되면 토큰을 취소해 상대 펌프를 깨웁니다.
//! 이 토큰은 방이 가진 퇴출 토큰의 자식이므로, 방이 멤버를 퇴출하면 멈춰 있는 쓰기까지 포함해 두 펌프가 모두 끝납니다.
//! 수신 펌프는 종료 시 항상 `leave`를 보내고, 송신 펌프는 종료 시 항상 쓰기 방향을 닫습니다.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::protocol::format_broadcast;
use crate::service::room::{MemberId, MemberSlot, RoomHandle};
use crate::tool::error::{ErrorHandler, RelayError, RelayResult};
use crate::transport::{Endpoint, FrameReader, FrameWriter};

/// 펌프 시간 제한 옵션. 기본값은 둘 다 비활성화입니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpOptions {
    /// 이 시간 동안 아무 메시지도 읽지 못하면 연결을 끊습니다.
    pub idle_timeout: Option<Duration>,
    /// 메시지 하나를 쓰는 데 이 시간을 넘기면 연결을 끊습니다.
    pub write_timeout: Option<Duration>,
}

impl PumpOptions {
    /// 초 단위 설정값으로 옵션을 만듭니다. 0은 비활성화를 뜻합니다.
    pub fn from_secs(idle_timeout_secs: u64, write_timeout_secs: u64) -> Self {
        let non_zero = |secs: u64| (secs > 0).then(|| Duration::from_secs(secs));
        Self {
            idle_timeout: non_zero(idle_timeout_secs),
            write_timeout: non_zero(write_timeout_secs),
        }
    }
}

/// 펌프가 멈춘 이유
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StopReason {
    /// 상대방이 정상적으로 연결을 닫음
    PeerClosed,
    /// 반대쪽 펌프가 먼저 종료됨
    Cancelled,
    /// 송신 큐가 가득 차 방에서 퇴출됨
    Evicted,
    /// 송신 큐가 닫히고 모두 비워짐
    QueueClosed,
    /// 방이 닫혀 더 이상 브로드캐스트할 수 없음
    RoomClosed,
    IdleTimeout,
    WriteTimeout,
    /// 전송 계층 읽기/쓰기 실패
    TransportFailed(String),
    /// 펌프 태스크가 비정상 종료됨
    Aborted,
}

impl StopReason {
    fn from_error(error: &RelayError) -> Self {
        match error {
            RelayError::IdleTimeout { .. } => StopReason::IdleTimeout,
            RelayError::WriteTimeout { .. } => StopReason::WriteTimeout,
            RelayError::RoomClosed { .. } => StopReason::RoomClosed,
            other => StopReason::TransportFailed(other.to_string()),
        }
    }
}

/// 멤버 연결 종료 보고서
#[derive(Debug, Clone, Serialize)]
pub struct MemberReport {
    pub id: MemberId,
    pub identity: String,
    pub room: String,
    pub inbound: StopReason,
    pub outbound: StopReason,
}

/// 방에 가입한 참가자 한 명
pub struct Member {
    id: MemberId,
    identity: Arc<str>,
    room: RoomHandle,
    queue: mpsc::Receiver<Bytes>,
    evict: CancellationToken,
}

impl Member {
    /// 송신 큐를 만들고 방에 가입합니다.
    ///
    /// 가입 요청은 펌프가 시작되기 전에 제출됩니다.
    ///
    /// # Arguments
    ///
    /// * `room` - 가입할 방
    /// * `identity` - 브로드캐스트 접두어로 쓰일 표시 이름
    /// * `queue_capacity` - 송신 큐 용량. 가득 차면 방이 이 멤버를 퇴출합니다.
    ///
    /// # Returns
    ///
    /// 방이 이미 닫혔으면 [`RelayError::RoomClosed`]
    pub async fn join(
        room: &RoomHandle,
        identity: &str,
        queue_capacity: usize,
    ) -> RelayResult<Member> {
        let (outbound, queue) = mpsc::channel(queue_capacity.max(1));
        let id = MemberId::next();
        let identity: Arc<str> = Arc::from(identity);
        let evict = CancellationToken::new();

        room.join(MemberSlot {
            id,
            identity: identity.clone(),
            outbound,
            evict: evict.clone(),
        })
        .await?;

        Ok(Member {
            id,
            identity,
            room: room.clone(),
            queue,
            evict,
        })
    }

    pub fn id(&self) -> MemberId {
        self.id
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn room(&self) -> &RoomHandle {
        &self.room
    }

    /// 두 펌프를 시작하고 둘 다 끝날 때까지 기다립니다.
    pub async fn run<E: Endpoint>(self, endpoint: E, options: PumpOptions) -> MemberReport {
        let peer = endpoint.peer();
        let (reader, writer) = endpoint.split();
        let token = self.evict.child_token();

        info!(
            room = self.room.name(),
            member = %self.id,
            identity = %self.identity,
            peer = %peer,
            "✅ 멤버 연결 시작"
        );

        let inbound = tokio::spawn(inbound_pump(
            reader,
            self.room.clone(),
            self.id,
            self.identity.clone(),
            options.idle_timeout,
            token.clone(),
            self.evict.clone(),
        ));
        let outbound = tokio::spawn(outbound_pump(
            writer,
            self.queue,
            options.write_timeout,
            token,
            self.evict.clone(),
        ));

        let inbound = inbound.await.unwrap_or(StopReason::Aborted);
        let outbound = outbound.await.unwrap_or(StopReason::Aborted);

        info!(
            room = self.room.name(),
            member = %self.id,
            identity = %self.identity,
            inbound = ?inbound,
            outbound = ?outbound,
            "👋 멤버 연결 종료"
        );

        MemberReport {
            id: self.id,
            identity: self.identity.to_string(),
            room: self.room.name().to_string(),
            inbound,
            outbound,
        }
    }
}

async fn read_next<R: FrameReader>(
    reader: &mut R,
    idle_timeout: Option<Duration>,
) -> RelayResult<Option<Bytes>> {
    match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, reader.read_frame())
            .await
            .map_err(|_| RelayError::IdleTimeout {
                secs: limit.as_secs(),
            })?,
        None => reader.read_frame().await,
    }
}

async fn write_next<W: FrameWriter>(
    writer: &mut W,
    frame: Bytes,
    write_timeout: Option<Duration>,
) -> RelayResult<()> {
    match write_timeout {
        Some(limit) => tokio::time::timeout(limit, writer.write_frame(frame))
            .await
            .map_err(|_| RelayError::WriteTimeout {
                secs: limit.as_secs(),
            })?,
        None => writer.write_frame(frame).await,
    }
}

/// 토큰이 취소된 이유: 방의 퇴출인지 반대쪽 펌프의 종료인지
fn cancelled_reason(evict: &CancellationToken) -> StopReason {
    if evict.is_cancelled() {
        StopReason::Evicted
    } else {
        StopReason::Cancelled
    }
}

/// 수신 펌프: 메시지를 읽어 `"{identity}: {payload}"`로 방에 브로드캐스트합니다.
async fn inbound_pump<R: FrameReader>(
    mut reader: R,
    room: RoomHandle,
    id: MemberId,
    identity: Arc<str>,
    idle_timeout: Option<Duration>,
    token: CancellationToken,
    evict: CancellationToken,
) -> StopReason {
    let reason = loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => break cancelled_reason(&evict),
            result = read_next(&mut reader, idle_timeout) => result,
        };

        match next {
            Ok(Some(payload)) => {
                if let Err(e) = room.broadcast(format_broadcast(&identity, &payload)).await {
                    ErrorHandler::handle_transport_error(&e, "Member", "inbound_pump");
                    break StopReason::from_error(&e);
                }
            }
            Ok(None) => break StopReason::PeerClosed,
            Err(e) => {
                ErrorHandler::handle_transport_error(&e, "Member", "inbound_pump");
                break StopReason::from_error(&e);
            }
        }
    };

    room.leave(id).await;
    token.cancel();
    debug!(member = %id, reason = ?reason, "수신 펌프 종료");
    reason
}

/// 송신 펌프: 송신 큐의 메시지를 순서대로 씁니다.
async fn outbound_pump<W: FrameWriter>(
    mut writer: W,
    mut queue: mpsc::Receiver<Bytes>,
    write_timeout: Option<Duration>,
    token: CancellationToken,
    evict: CancellationToken,
) -> StopReason {
    let reason = loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => break cancelled_reason(&evict),
            item = queue.recv() => item,
        };
        let Some(frame) = next else {
            break StopReason::QueueClosed;
        };

        let written = tokio::select! {
            biased;
            _ = token.cancelled() => break cancelled_reason(&evict),
            result = write_next(&mut writer, frame, write_timeout) => result,
        };
        if let Err(e) = written {
            ErrorHandler::handle_transport_error(&e, "Member", "outbound_pump");
            break StopReason::from_error(&e);
        }
    };

    if let Err(e) = writer.close().await {
        debug!("쓰기 방향 닫기 실패: {}", e);
    }
    token.cancel();
    reason
}
