//! 연결 핸들러
//!
//! 전송 계층이 검증한 입장 파라미터와 엔드포인트를 받아 코어에 연결합니다.
//! 방을 찾거나 만들고, 멤버를 가입시키고, 두 펌프가 끝날 때까지 기다립니다.

use std::sync::Arc;

use tracing::{debug, info};

use crate::protocol::JoinParams;
use crate::service::member::{Member, MemberReport, PumpOptions};
use crate::service::registry::RoomRegistry;
use crate::tool::error::{RelayError, RelayResult};
use crate::transport::Endpoint;

/// 연결 핸들러
#[derive(Clone)]
pub struct ConnectionHandler {
    registry: Arc<RoomRegistry>,
    queue_capacity: usize,
    pump_options: PumpOptions,
}

impl ConnectionHandler {
    /// 새로운 연결 핸들러 생성
    pub fn new(registry: Arc<RoomRegistry>, queue_capacity: usize, pump_options: PumpOptions) -> Self {
        Self {
            registry,
            queue_capacity,
            pump_options,
        }
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// 연결 하나를 끝까지 처리합니다.
    ///
    /// 방이 정리되는 순간과 겹쳐 가입이 실패하면 새로 만든 방으로 한 번 더 시도합니다.
    ///
    /// # Arguments
    ///
    /// * `params` - 검증된 방 이름과 identity
    /// * `endpoint` - 핸드셰이크가 끝난 연결
    ///
    /// # Returns
    ///
    /// 두 펌프의 종료 이유를 담은 보고서
    pub async fn handle<E: Endpoint>(
        &self,
        params: JoinParams,
        endpoint: E,
    ) -> RelayResult<MemberReport> {
        let member = self.join(&params).await?;
        info!(
            room = params.room(),
            identity = params.identity(),
            peer = %endpoint.peer(),
            "🔗 새 연결 방 입장"
        );

        Ok(member.run(endpoint, self.pump_options).await)
    }

    async fn join(&self, params: &JoinParams) -> RelayResult<Member> {
        let room = self.registry.get_or_create(params.room());
        match Member::join(&room, params.identity(), self.queue_capacity).await {
            Err(RelayError::RoomClosed { .. }) => {
                debug!(room = params.room(), "정리 중인 방, 새 방으로 재시도");
                let room = self.registry.get_or_create(params.room());
                Member::join(&room, params.identity(), self.queue_capacity).await
            }
            result => result,
        }
    }
}
