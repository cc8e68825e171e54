//! WebSocket 전송 계층
//!
//! HTTP 업그레이드 요청의 쿼리 파라미터(`room`, `username`)로 방과 identity를 받습니다.
//! 둘 중 하나라도 없으면 업그레이드 대신 400 응답을 보내고 연결을 맺지 않습니다.
//!
//! ```text
//! ws://host:port/?room=lobby&username=alice
//! ```
//!
//! 텍스트/바이너리 메시지는 모두 payload로 취급합니다. ping/pong은 프로토콜 계층이 처리하고,
//! close 프레임은 정상 종료로 취급합니다.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{self, Message, Utf8Bytes};
use tokio_tungstenite::{accept_hdr_async_with_config, WebSocketStream};
use tracing::{debug, warn};

use super::{Endpoint, FrameReader, FrameWriter};
use crate::protocol::{JoinParams, MISSING_PARAMS_MESSAGE};
use crate::tool::error::{RelayError, RelayResult};

/// WebSocket 엔드포인트
pub struct WsEndpoint {
    peer: String,
    stream: WebSocketStream<TcpStream>,
}

impl WsEndpoint {
    /// 업그레이드를 수행하고 입장 파라미터와 엔드포인트를 반환합니다.
    ///
    /// `max_message_bytes`보다 큰 메시지는 읽기 에러가 됩니다.
    pub async fn accept(
        stream: TcpStream,
        max_message_bytes: usize,
    ) -> RelayResult<(JoinParams, WsEndpoint)> {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        let mut params = None;
        let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            match JoinParams::from_query(request.uri().query()) {
                Ok(parsed) => {
                    params = Some(parsed);
                    Ok(response)
                }
                Err(_) => {
                    let mut rejection = ErrorResponse::new(Some(MISSING_PARAMS_MESSAGE.to_string()));
                    *rejection.status_mut() = StatusCode::BAD_REQUEST;
                    Err(rejection)
                }
            }
        };

        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(max_message_bytes);
        config.max_frame_size = Some(max_message_bytes);

        let accepted = accept_hdr_async_with_config(stream, callback, Some(config)).await;
        let stream = match accepted {
            Ok(stream) => stream,
            Err(tungstenite::Error::Http(_)) if params.is_none() => {
                warn!(peer = %peer, "업그레이드 거부: {}", MISSING_PARAMS_MESSAGE);
                return Err(RelayError::MissingJoinParams);
            }
            Err(e) => return Err(e.into()),
        };

        let params = params.ok_or(RelayError::MissingJoinParams)?;
        debug!(peer = %peer, room = params.room(), identity = params.identity(), "WebSocket 업그레이드 완료");

        Ok((params, WsEndpoint { peer, stream }))
    }
}

impl Endpoint for WsEndpoint {
    type Reader = WsFrameReader;
    type Writer = WsFrameWriter;

    fn split(self) -> (WsFrameReader, WsFrameWriter) {
        let (sink, stream) = self.stream.split();
        (
            WsFrameReader { inner: stream },
            WsFrameWriter {
                inner: sink,
                closed: false,
            },
        )
    }

    fn peer(&self) -> String {
        self.peer.clone()
    }
}

pub struct WsFrameReader {
    inner: SplitStream<WebSocketStream<TcpStream>>,
}

#[async_trait]
impl FrameReader for WsFrameReader {
    async fn read_frame(&mut self) -> RelayResult<Option<Bytes>> {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(Bytes::copy_from_slice(text.as_str().as_bytes())))
                }
                Some(Ok(Message::Binary(data))) => return Ok(Some(data)),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                // ping/pong 응답은 tungstenite가 처리
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }
}

pub struct WsFrameWriter {
    inner: SplitSink<WebSocketStream<TcpStream>, Message>,
    closed: bool,
}

#[async_trait]
impl FrameWriter for WsFrameWriter {
    async fn write_frame(&mut self, frame: Bytes) -> RelayResult<()> {
        if self.closed {
            return Err(RelayError::transport("write_frame", "이미 닫힌 연결"));
        }
        // UTF-8이면 텍스트, 아니면 바이너리 메시지 (payload 복사 없음)
        let message = match Utf8Bytes::try_from(frame.clone()) {
            Ok(text) => Message::Text(text),
            Err(_) => Message::Binary(frame),
        };
        self.inner.send(message).await?;
        Ok(())
    }

    async fn close(&mut self) -> RelayResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.inner.close().await {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::connect_async;

    async fn spawn_accept() -> (
        String,
        tokio::task::JoinHandle<RelayResult<(JoinParams, WsEndpoint)>>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            WsEndpoint::accept(stream, 64 * 1024).await
        });
        (format!("ws://{}", addr), handle)
    }

    #[tokio::test]
    async fn test_upgrade_with_query_params() {
        let (base, handle) = spawn_accept().await;
        let (mut client, _) = connect_async(format!("{}/?room=lobby&username=alice", base))
            .await
            .unwrap();

        let (params, endpoint) = handle.await.unwrap().unwrap();
        assert_eq!(params.room(), "lobby");
        assert_eq!(params.identity(), "alice");

        let (mut reader, mut writer) = endpoint.split();

        client.send(Message::text("hi")).await.unwrap();
        assert_eq!(reader.read_frame().await.unwrap(), Some(Bytes::from("hi")));

        client
            .send(Message::binary(vec![0xffu8, 0x00]))
            .await
            .unwrap();
        assert_eq!(
            reader.read_frame().await.unwrap(),
            Some(Bytes::from(vec![0xffu8, 0x00]))
        );

        writer.write_frame(Bytes::from("alice: hi")).await.unwrap();
        match client.next().await.unwrap().unwrap() {
            Message::Text(text) => assert_eq!(text.as_str(), "alice: hi"),
            other => panic!("예상하지 못한 메시지: {:?}", other),
        }

        // UTF-8이 아닌 payload는 바이너리 메시지로 그대로 전달
        writer
            .write_frame(Bytes::from_static(b"bob: \xde\xad"))
            .await
            .unwrap();
        match client.next().await.unwrap().unwrap() {
            Message::Binary(data) => assert_eq!(&data[..], b"bob: \xde\xad"),
            other => panic!("바이너리 메시지여야 함: {:?}", other),
        }

        writer.close().await.unwrap();
        writer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_upgrade_rejected_without_username() {
        let (base, handle) = spawn_accept().await;
        let result = connect_async(format!("{}/?room=lobby", base)).await;

        match result {
            Err(tungstenite::Error::Http(response)) => {
                assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            }
            other => panic!("400 응답이어야 함: {:?}", other.map(|_| ())),
        }

        assert!(matches!(
            handle.await.unwrap(),
            Err(RelayError::MissingJoinParams)
        ));
    }

    #[tokio::test]
    async fn test_client_close_is_clean_end() {
        let (base, handle) = spawn_accept().await;
        let (mut client, _) = connect_async(format!("{}/?room=lobby&username=bob", base))
            .await
            .unwrap();
        let (_, endpoint) = handle.await.unwrap().unwrap();
        let (mut reader, _writer) = endpoint.split();

        client.close(None).await.unwrap();
        assert_eq!(reader.read_frame().await.unwrap(), None);
    }
}
