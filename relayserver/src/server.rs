//! 릴레이 서버
//!
//! 리스너에서 연결을 받아 설정된 전송 방식으로 핸드셰이크한 뒤 [`ConnectionHandler`]에 넘깁니다.
//! 연결마다 태스크 하나가 만들어지며, 한 연결의 실패는 다른 연결이나 accept 루프에 영향을 주지 않습니다.
//! 포트 바인딩 실패만이 치명적인 에러입니다.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::{RelayConfig, TransportKind};
use crate::handler::ConnectionHandler;
use crate::service::reaper::RoomReaper;
use crate::service::registry::RoomRegistry;
use crate::tool::error::{ErrorHandler, ErrorSeverity, RelayError, RelayResult};
use crate::transport::tcp::HANDSHAKE_TIMEOUT;
use crate::transport::{TcpEndpoint, WsEndpoint};

/// 릴레이 서버
pub struct RelayServer {
    config: RelayConfig,
    registry: Arc<RoomRegistry>,
    handler: ConnectionHandler,
    reaper: Option<RoomReaper>,
}

impl RelayServer {
    /// 설정으로부터 레지스트리와 핸들러를 구성합니다.
    ///
    /// 빈 방 정리 간격이 0이면 정리 작업을 만들지 않습니다.
    pub fn new(config: RelayConfig) -> Self {
        let registry = Arc::new(RoomRegistry::new(config.room_intake_capacity));
        let handler = ConnectionHandler::new(
            registry.clone(),
            config.queue_capacity,
            config.pump_options(),
        );
        let reaper = config
            .reap_interval()
            .map(|interval| RoomReaper::new(registry.clone(), interval));

        Self {
            config,
            registry,
            handler,
            reaper,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    pub fn reaper(&self) -> Option<&RoomReaper> {
        self.reaper.as_ref()
    }

    /// 설정된 주소에 바인딩하고 종료 신호까지 연결을 받습니다.
    pub async fn serve(&self, shutdown: CancellationToken) -> Result<()> {
        let bind_addr = self.config.bind_address();
        info!("🚀 릴레이 서버 시작 중... ({}, {})", bind_addr, self.config.transport);

        let listener = TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("리스너 바인드 실패: {}", bind_addr))?;

        self.run(listener, shutdown).await
    }

    /// 이미 바인딩된 리스너로 accept 루프를 실행합니다.
    pub async fn run(&self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let local_addr = listener.local_addr().context("로컬 주소 조회 실패")?;
        info!("✅ 릴레이 서버가 {}에서 실행 중입니다", local_addr);

        if let Some(reaper) = &self.reaper {
            reaper.start().await?;
        }

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!("새 연결: {}", addr);
                        tokio::spawn(serve_connection(
                            stream,
                            addr,
                            self.config.transport,
                            self.config.max_frame_bytes,
                            self.handler.clone(),
                        ));
                    }
                    Err(e) => {
                        error!("연결 수락 실패: {}", e);
                    }
                },
            }
        }

        if let Some(reaper) = &self.reaper {
            reaper.stop().await?;
        }
        info!("🛑 릴레이 서버 accept 루프 종료");
        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    addr: SocketAddr,
    transport: TransportKind,
    max_frame_bytes: usize,
    handler: ConnectionHandler,
) {
    let result = match transport {
        TransportKind::WebSocket => match WsEndpoint::accept(stream, max_frame_bytes).await {
            Ok((params, endpoint)) => handler.handle(params, endpoint).await,
            Err(e) => Err(e),
        },
        TransportKind::Tcp => {
            match TcpEndpoint::accept(stream, max_frame_bytes, HANDSHAKE_TIMEOUT).await {
                Ok((params, endpoint)) => handler.handle(params, endpoint).await,
                Err(e) => Err(e),
            }
        }
    };

    log_outcome(addr, result);
}

fn log_outcome<T>(addr: SocketAddr, result: RelayResult<T>) {
    if let Err(e) = result {
        let severity = match &e {
            RelayError::MissingJoinParams => ErrorSeverity::Info,
            e if e.is_disconnect() => ErrorSeverity::Info,
            _ => ErrorSeverity::Warning,
        };
        debug!(peer = %addr, "연결 처리 실패");
        ErrorHandler::handle_error(&e, severity, "RelayServer", "serve_connection");
    }
}
