//! 过期记录的后台清理

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

use super::manager::OtpManager;
use super::store::TokenStore;

/// 启动定期清理任务
///
/// 每隔 `every` 调用一次 [`OtpManager::sweep`]。清理失败只记录日志，下一轮继续。
/// 需要在 tokio 运行时中调用；丢弃返回的句柄不会停止任务，需要时调用 `abort()`。
///
/// # Panics
///
/// `every` 为零时 panic。
pub fn spawn_sweeper<S>(manager: Arc<OtpManager<S>>, every: Duration) -> JoinHandle<()>
where
    S: TokenStore + 'static,
{
    assert!(!every.is_zero(), "sweep interval must be non-zero");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            debug!("token sweep: start");
            if let Err(e) = manager.sweep().await {
                error!(error = %e, "token sweep failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::OtpConfig;
    use crate::otp::Purpose;

    #[tokio::test]
    async fn test_sweeper_removes_expired_tokens() {
        let clock = Arc::new(ManualClock::starting_now());
        let manager = Arc::new(
            OtpManager::new(OtpConfig::default())
                .unwrap()
                .with_clock(clock.clone()),
        );

        manager
            .issue("aluno@cs.udf.edu.br", Purpose::Activation)
            .await
            .unwrap();
        clock.advance(Duration::from_secs(31 * 60));

        let handle = spawn_sweeper(manager.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert!(manager.store().is_empty());
    }

    #[tokio::test]
    #[should_panic(expected = "sweep interval must be non-zero")]
    async fn test_zero_interval_panics_in_caller() {
        let manager = Arc::new(OtpManager::with_default_config());
        let _ = spawn_sweeper(manager, Duration::ZERO);
    }
}
