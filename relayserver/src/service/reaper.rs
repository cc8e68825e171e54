//! 빈 방 정리 서비스
//!
//! 주기적으로 [`RoomRegistry::reap_idle`]을 실행해 멤버가 없는 방을 닫습니다.
//! 정리 간격이 0이면 서버는 이 서비스를 만들지 않으며, 빈 방은 프로세스가 끝날 때까지 유지됩니다.

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::service::registry::RoomRegistry;

/// 정리 통계
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReaperStats {
    pub sweeps: u64,
    pub rooms_reaped: u64,
    /// 마지막으로 방을 정리한 시간 (Unix timestamp)
    pub last_reap_timestamp: Option<i64>,
}

/// 빈 방 정리 서비스
pub struct RoomReaper {
    registry: Arc<RoomRegistry>,
    interval: Duration,
    is_running: Arc<Mutex<bool>>,
    sweep_handle: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
    stats: Arc<Mutex<ReaperStats>>,
}

impl RoomReaper {
    pub fn new(registry: Arc<RoomRegistry>, interval: Duration) -> Self {
        Self {
            registry,
            interval,
            is_running: Arc::new(Mutex::new(false)),
            sweep_handle: Arc::new(Mutex::new(None)),
            stats: Arc::new(Mutex::new(ReaperStats::default())),
        }
    }

    /// 주기적 정리 작업 시작
    pub async fn start(&self) -> Result<()> {
        let mut is_running = self.is_running.lock().await;

        if *is_running {
            warn!("빈 방 정리 작업이 이미 실행 중입니다");
            return Ok(());
        }
        if self.interval.is_zero() {
            anyhow::bail!("정리 간격은 0보다 커야 합니다");
        }

        *is_running = true;
        drop(is_running);

        info!("🧹 빈 방 정리 작업 시작 ({}초 간격)", self.interval.as_secs());

        let registry = self.registry.clone();
        let stats = self.stats.clone();
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // 첫 tick은 즉시 완료되므로 건너뜀
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let reaped = registry.reap_idle().await;
                record_sweep(&stats, reaped.len()).await;

                if reaped.is_empty() {
                    debug!("정리할 빈 방 없음 (활성 방: {}개)", registry.room_count());
                }
            }
        });

        *self.sweep_handle.lock().await = Some(handle);
        Ok(())
    }

    /// 정리 작업 중지
    pub async fn stop(&self) -> Result<()> {
        let mut is_running = self.is_running.lock().await;

        if !*is_running {
            warn!("빈 방 정리 작업이 이미 중지되어 있습니다");
            return Ok(());
        }

        *is_running = false;
        drop(is_running);

        if let Some(handle) = self.sweep_handle.lock().await.take() {
            handle.abort();
        }

        info!("✅ 빈 방 정리 작업 중지 완료");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.lock().await
    }

    /// 즉시 한 번 정리합니다.
    ///
    /// # Returns
    ///
    /// 정리된 방 수
    pub async fn sweep_now(&self) -> usize {
        let reaped = self.registry.reap_idle().await;
        record_sweep(&self.stats, reaped.len()).await;
        reaped.len()
    }

    pub async fn stats(&self) -> ReaperStats {
        self.stats.lock().await.clone()
    }
}

async fn record_sweep(stats: &Mutex<ReaperStats>, reaped: usize) {
    let mut stats = stats.lock().await;
    stats.sweeps += 1;
    if reaped > 0 {
        stats.rooms_reaped += reaped as u64;
        stats.last_reap_timestamp = Some(chrono::Utc::now().timestamp());
    }
}
