//! 프로세스 내부 엔드포인트
//!
//! tokio 채널로 만든 엔드포인트입니다. 소켓 없이 멤버 펌프를 구동할 때 사용합니다.
//! [`MemoryPeer`]는 클라이언트 쪽 역할을 하며 메시지 전송, 수신, 전송 실패 주입이 가능합니다.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use super::{Endpoint, FrameReader, FrameWriter};
use crate::tool::error::{RelayError, RelayResult};

type Inbound = RelayResult<Bytes>;

/// 서버 쪽 엔드포인트
pub struct MemoryEndpoint {
    label: String,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    outbound: mpsc::Sender<Bytes>,
}

/// 클라이언트 쪽 상대방
pub struct MemoryPeer {
    inbound: Option<mpsc::UnboundedSender<Inbound>>,
    outbound: mpsc::Receiver<Bytes>,
}

impl MemoryEndpoint {
    /// 엔드포인트와 상대방 쌍을 만듭니다.
    ///
    /// `write_buffer`는 상대방이 읽지 않아도 쓸 수 있는 메시지 수입니다.
    /// 이 값을 넘기면 서버 쪽 쓰기가 대기하므로 느린 수신자를 흉내낼 수 있습니다.
    pub fn pair(label: impl Into<String>, write_buffer: usize) -> (MemoryEndpoint, MemoryPeer) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::channel(write_buffer.max(1));

        let endpoint = MemoryEndpoint {
            label: label.into(),
            inbound: inbound_rx,
            outbound: outbound_tx,
        };
        let peer = MemoryPeer {
            inbound: Some(inbound_tx),
            outbound: outbound_rx,
        };
        (endpoint, peer)
    }
}

impl Endpoint for MemoryEndpoint {
    type Reader = MemoryReader;
    type Writer = MemoryWriter;

    fn split(self) -> (MemoryReader, MemoryWriter) {
        (
            MemoryReader {
                inbound: self.inbound,
            },
            MemoryWriter {
                outbound: Some(self.outbound),
            },
        )
    }

    fn peer(&self) -> String {
        format!("memory:{}", self.label)
    }
}

pub struct MemoryReader {
    inbound: mpsc::UnboundedReceiver<Inbound>,
}

#[async_trait]
impl FrameReader for MemoryReader {
    async fn read_frame(&mut self) -> RelayResult<Option<Bytes>> {
        match self.inbound.recv().await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

pub struct MemoryWriter {
    outbound: Option<mpsc::Sender<Bytes>>,
}

#[async_trait]
impl FrameWriter for MemoryWriter {
    async fn write_frame(&mut self, frame: Bytes) -> RelayResult<()> {
        let outbound = self
            .outbound
            .as_ref()
            .ok_or_else(|| RelayError::transport("write_frame", "이미 닫힌 엔드포인트"))?;
        outbound
            .send(frame)
            .await
            .map_err(|_| RelayError::transport("write_frame", "상대방 연결 끊김"))
    }

    async fn close(&mut self) -> RelayResult<()> {
        self.outbound.take();
        Ok(())
    }
}

impl MemoryPeer {
    /// 서버로 메시지 하나를 보냅니다. 이미 끊긴 경우 `false`를 반환합니다.
    pub fn send(&self, payload: impl Into<Bytes>) -> bool {
        match &self.inbound {
            Some(tx) => tx.send(Ok(payload.into())).is_ok(),
            None => false,
        }
    }

    /// 서버 쪽 읽기에 전송 실패를 주입하고 보내는 방향을 끊습니다.
    pub fn fail(&mut self, reason: &str) {
        if let Some(tx) = self.inbound.take() {
            let _ = tx.send(Err(RelayError::transport("read_frame", reason)));
        }
    }

    /// 보내는 방향을 정상 종료합니다. 서버 쪽 읽기는 `Ok(None)`을 받습니다.
    pub fn hang_up(&mut self) {
        self.inbound.take();
    }

    /// 서버가 보낸 다음 메시지를 기다립니다. 서버가 쓰기 방향을 닫으면 `None`.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.outbound.recv().await
    }

    /// 대기 없이 서버가 보낸 메시지를 꺼냅니다.
    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.outbound.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_pair_round_trip() {
        let (endpoint, mut peer) = MemoryEndpoint::pair("alice", 4);
        assert_eq!(endpoint.peer(), "memory:alice");
        let (mut reader, mut writer) = endpoint.split();

        assert!(peer.send("hello"));
        assert_eq!(reader.read_frame().await.unwrap(), Some(Bytes::from("hello")));

        writer.write_frame(Bytes::from("world")).await.unwrap();
        assert_eq!(peer.recv().await, Some(Bytes::from("world")));
    }

    #[tokio::test]
    async fn test_memory_failure_and_hang_up() {
        let (endpoint, mut peer) = MemoryEndpoint::pair("bob", 1);
        let (mut reader, _writer) = endpoint.split();

        peer.fail("connection reset");
        assert!(matches!(
            reader.read_frame().await,
            Err(RelayError::Transport { .. })
        ));
        assert_eq!(reader.read_frame().await.unwrap(), None);
        assert!(!peer.send("late"));

        let (endpoint, mut peer) = MemoryEndpoint::pair("carol", 1);
        let (mut reader, _writer) = endpoint.split();
        peer.hang_up();
        assert_eq!(reader.read_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_writer_close_is_idempotent() {
        let (endpoint, mut peer) = MemoryEndpoint::pair("dave", 1);
        let (_reader, mut writer) = endpoint.split();

        writer.close().await.unwrap();
        writer.close().await.unwrap();
        assert!(writer.write_frame(Bytes::from("x")).await.is_err());
        assert_eq!(peer.recv().await, None);
    }

    #[tokio::test]
    async fn test_memory_write_fails_after_peer_dropped() {
        let (endpoint, peer) = MemoryEndpoint::pair("erin", 1);
        let (_reader, mut writer) = endpoint.split();
        drop(peer);

        assert!(writer.write_frame(Bytes::from("x")).await.is_err());
    }
}
