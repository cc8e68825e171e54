//! 릴레이 서버 실행 파일
//!
//! 이름 있는 방 단위로 메시지를 모든 멤버에게 중계합니다.

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use relayserver::{validate_config, RelayConfig, RelayServer};

/// 릴레이 서버 메인 진입점
///
/// 환경변수:
/// - relay_host: 바인딩 호스트 (기본값: "0.0.0.0")
/// - PORT: 바인딩 포트 (기본값: "8080")
/// - relay_transport: "websocket" 또는 "tcp" (기본값: "websocket")
/// - relay_queue_capacity: 멤버별 송신 큐 용량 (기본값: 256)
/// - relay_room_intake_capacity: 방별 요청 채널 용량 (기본값: 1024)
/// - relay_max_frame_bytes: 메시지 최대 크기 (기본값: 65536)
/// - relay_idle_timeout_secs: 읽기 유휴 시간 제한, 0이면 사용 안 함
/// - relay_write_timeout_secs: 쓰기 시간 제한, 0이면 사용 안 함
/// - relay_room_reap_secs: 빈 방 정리 간격, 0이면 정리 안 함
#[tokio::main]
async fn main() -> Result<()> {
    // 로깅 설정
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // 환경 설정 로드 및 검증
    let config = RelayConfig::from_env()?;
    validate_config(&config)?;

    info!("=== 릴레이 서버 설정 ===");
    info!("주소: {}", config.bind_address());
    info!("전송 방식: {}", config.transport);
    info!("송신 큐 용량: {}", config.queue_capacity);
    info!("빈 방 정리: {:?}", config.reap_interval());
    info!("========================");

    let server = RelayServer::new(config);
    let shutdown = CancellationToken::new();

    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("종료 시그널 수신, 서버를 중지합니다...");
                signal.cancel();
            }
            Err(e) => error!("종료 시그널 대기 실패: {}", e),
        }
    });

    server.serve(shutdown).await?;

    info!("✅ 릴레이 서버가 성공적으로 중지되었습니다");
    Ok(())
}
