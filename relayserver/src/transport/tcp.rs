//! TCP 전송 계층
//!
//! 모든 프레임은 4바이트 빅엔디언 길이 헤더와 payload로 구성됩니다.
//!
//! ```text
//! [4바이트 길이 헤더][payload]
//! ```
//!
//! 연결 직후 클라이언트는 JSON 핸드셰이크 프레임([`JoinRequest`])을 보내야 하며,
//! 서버는 [`ServerReply`] 프레임으로 응답합니다. 이후 프레임은 모두 원본 메시지입니다.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tracing::{debug, warn};

use super::{Endpoint, FrameReader, FrameWriter};
use crate::protocol::{JoinParams, JoinRequest, ServerReply};
use crate::tool::error::{RelayError, RelayResult};

/// 핸드셰이크 프레임 대기 시간
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// 4바이트 빅엔디언 길이 헤더 코덱을 만듭니다.
///
/// `max_frame_bytes`를 넘는 프레임은 읽기/쓰기 에러가 됩니다.
pub fn frame_codec(max_frame_bytes: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .big_endian()
        .max_frame_length(max_frame_bytes)
        .new_codec()
}

/// 길이 헤더 프레임 기반 TCP 엔드포인트
pub struct TcpEndpoint {
    peer: String,
    reader: FramedRead<OwnedReadHalf, LengthDelimitedCodec>,
    writer: FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>,
}

impl TcpEndpoint {
    /// 핸드셰이크 없이 스트림을 엔드포인트로 감쌉니다.
    pub fn new(stream: TcpStream, max_frame_bytes: usize) -> Self {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let (read_half, write_half) = stream.into_split();

        Self {
            peer,
            reader: FramedRead::new(read_half, frame_codec(max_frame_bytes)),
            writer: FramedWrite::new(write_half, frame_codec(max_frame_bytes)),
        }
    }

    /// 핸드셰이크를 수행하고 입장 파라미터와 엔드포인트를 반환합니다.
    ///
    /// 방 이름이나 identity가 없으면 400 에러 프레임을 보내고 연결을 닫습니다.
    /// 이 경우 연결은 코어로 전달되지 않습니다.
    pub async fn accept(
        stream: TcpStream,
        max_frame_bytes: usize,
        handshake_timeout: Duration,
    ) -> RelayResult<(JoinParams, TcpEndpoint)> {
        let mut endpoint = Self::new(stream, max_frame_bytes);

        let first = tokio::time::timeout(handshake_timeout, endpoint.reader.next())
            .await
            .map_err(|_| RelayError::protocol("핸드셰이크 시간 초과"))?;

        let frame = match first {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => return Err(e.into()),
            None => {
                return Err(RelayError::transport(
                    "handshake",
                    "핸드셰이크 전에 연결이 종료되었습니다",
                ))
            }
        };

        let params = match JoinRequest::from_frame(&frame).and_then(JoinRequest::into_params) {
            Ok(params) => params,
            Err(e) => {
                let reply = match &e {
                    RelayError::MissingJoinParams => ServerReply::missing_params(),
                    other => ServerReply::Error {
                        code: 400,
                        message: other.to_string(),
                    },
                };
                warn!(peer = %endpoint.peer, "핸드셰이크 거부: {}", e);
                endpoint.reject(reply).await;
                return Err(e);
            }
        };

        endpoint
            .writer
            .send(ServerReply::joined(&params).to_frame()?)
            .await?;
        debug!(peer = %endpoint.peer, room = params.room(), identity = params.identity(), "핸드셰이크 완료");

        Ok((params, endpoint))
    }

    /// 거부 응답을 보내고 쓰기 방향을 닫습니다. 실패는 무시합니다.
    async fn reject(&mut self, reply: ServerReply) {
        if let Ok(frame) = reply.to_frame() {
            let _ = self.writer.send(frame).await;
        }
        let _ = SinkExt::<Bytes>::close(&mut self.writer).await;
    }
}

impl Endpoint for TcpEndpoint {
    type Reader = TcpFrameReader;
    type Writer = TcpFrameWriter;

    fn split(self) -> (TcpFrameReader, TcpFrameWriter) {
        (
            TcpFrameReader { inner: self.reader },
            TcpFrameWriter {
                inner: self.writer,
                closed: false,
            },
        )
    }

    fn peer(&self) -> String {
        self.peer.clone()
    }
}

pub struct TcpFrameReader {
    inner: FramedRead<OwnedReadHalf, LengthDelimitedCodec>,
}

#[async_trait]
impl FrameReader for TcpFrameReader {
    async fn read_frame(&mut self) -> RelayResult<Option<Bytes>> {
        match self.inner.next().await {
            Some(Ok(frame)) => Ok(Some(frame.freeze())),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }
}

pub struct TcpFrameWriter {
    inner: FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>,
    closed: bool,
}

#[async_trait]
impl FrameWriter for TcpFrameWriter {
    async fn write_frame(&mut self, frame: Bytes) -> RelayResult<()> {
        if self.closed {
            return Err(RelayError::transport("write_frame", "이미 닫힌 연결"));
        }
        self.inner.send(frame).await?;
        Ok(())
    }

    async fn close(&mut self) -> RelayResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        SinkExt::<Bytes>::close(&mut self.inner).await?;
        Ok(())
    }
}
