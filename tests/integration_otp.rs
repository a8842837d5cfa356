//! Token 生命周期集成测试
//!
//! 覆盖唯一性、一次性消费、过期和邮箱绑定等性质，以及并发场景。

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use campus_otp::{
    Error, ErrorKind, ManualClock, OtpConfig, OtpManager, Purpose, Result, SequenceTokenSource,
    TokenAction, TokenState, TokenStore,
};

const EMAIL: &str = "aluno@cs.udf.edu.br";

/// 模拟耗时的受保护操作，记录调用次数
#[derive(Default)]
struct SlowAction {
    calls: AtomicUsize,
}

#[async_trait]
impl TokenAction for SlowAction {
    async fn apply(&self, _email: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(())
    }
}

fn manager_with_clock() -> (Arc<OtpManager>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::starting_now());
    let manager = OtpManager::new(OtpConfig::default())
        .unwrap()
        .with_clock(clock.clone());
    (Arc::new(manager), clock)
}

// ============================================================================
// 签发
// ============================================================================

/// 签发的 token 形状
#[tokio::test]
async fn test_issue_scenario() {
    let (manager, _) = manager_with_clock();

    let record = manager.issue(EMAIL, Purpose::Activation).await.unwrap();

    assert_eq!(record.token.len(), 6);
    assert!(record.token.chars().all(|c| c.is_ascii_digit()));
    assert!(!record.is_used);
    assert_eq!(
        (record.expires_at - record.created_at).num_milliseconds(),
        1_800_000
    );
}

/// 并发签发不会产生重复 token
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_issue_uniqueness() {
    let (manager, _) = manager_with_clock();

    let mut handles = Vec::new();
    for i in 0..100 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            let purpose = if i % 2 == 0 {
                Purpose::Activation
            } else {
                Purpose::PasswordReset
            };
            manager.issue(EMAIL, purpose).await.unwrap().token
        }));
    }

    let mut tokens = HashSet::new();
    for handle in handles {
        assert!(tokens.insert(handle.await.unwrap()));
    }
    assert_eq!(manager.store().len(), 100);
}

/// 冲突时使用下一个候选值，且不覆盖已有记录
#[tokio::test]
async fn test_collision_does_not_overwrite() {
    let source = Arc::new(SequenceTokenSource::new(["500000", "500000", "600000"]));
    let manager = OtpManager::new(OtpConfig::default()).unwrap().with_token_source(source);

    let first = manager.issue(EMAIL, Purpose::Activation).await.unwrap();
    let second = manager
        .issue("outro@cs.udf.edu.br", Purpose::PasswordReset)
        .await
        .unwrap();

    assert_eq!(first.token, "500000");
    assert_eq!(second.token, "600000");

    let stored = manager.store().get("500000").await.unwrap().unwrap();
    assert_eq!(stored.email, EMAIL);
}

/// 尝试次数可配置
#[tokio::test]
async fn test_exhaustion_respects_configured_attempts() {
    let source = Arc::new(SequenceTokenSource::new(["700000"]));
    let config = OtpConfig::default().with_max_generation_attempts(3);
    let manager = OtpManager::new(config).unwrap().with_token_source(source);

    manager.issue(EMAIL, Purpose::Activation).await.unwrap();
    let err = manager.issue(EMAIL, Purpose::Activation).await.unwrap_err();

    assert!(matches!(err, Error::ResourceExhausted { attempts: 3 }));
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
}

// ============================================================================
// 验证
// ============================================================================

/// 仅验证 → 验证并标记 → 再次验证被拒绝
#[tokio::test]
async fn test_validate_scenario() {
    let (manager, _) = manager_with_clock();
    let record = manager.issue(EMAIL, Purpose::Activation).await.unwrap();

    assert!(manager.validate(EMAIL, &record.token, false).await.is_ok());
    assert!(manager.validate(EMAIL, &record.token, true).await.is_ok());

    let err = manager
        .validate(EMAIL, &record.token, false)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
}

/// 邮箱绑定：为 B 签发的 token 不能以 A 的身份验证
#[tokio::test]
async fn test_email_binding() {
    let (manager, _) = manager_with_clock();
    let record = manager
        .issue("colega@cs.udf.edu.br", Purpose::Activation)
        .await
        .unwrap();

    let err = manager
        .validate(EMAIL, &record.token, false)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert_eq!(err.reason(), "token_mismatch");

    // token 本身仍然有效
    assert!(
        manager
            .validate("colega@cs.udf.edu.br", &record.token, false)
            .await
            .is_ok()
    );
}

/// 未知 token
#[tokio::test]
async fn test_unknown_token() {
    let (manager, _) = manager_with_clock();

    let err = manager.validate(EMAIL, "999999", false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = manager.validate(EMAIL, "", false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// ============================================================================
// 过期
// ============================================================================

/// 过期后验证和消费都返回 DeadlineExceeded
#[tokio::test]
async fn test_expiry_monotonicity() {
    let (manager, clock) = manager_with_clock();
    let record = manager.issue(EMAIL, Purpose::PasswordReset).await.unwrap();
    let action = SlowAction::default();

    clock.advance(Duration::from_secs(30 * 60 + 1));
    assert_eq!(record.state_at(manager.now()), TokenState::Expired);

    for _ in 0..3 {
        let err = manager
            .validate(EMAIL, &record.token, false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeadlineExceeded);

        let err = manager
            .consume(EMAIL, &record.token, &action)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeadlineExceeded);
    }
    assert_eq!(action.calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// 消费
// ============================================================================

/// 同一 token 的并发消费只执行一次操作
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_consume_runs_action_once() {
    let (manager, _) = manager_with_clock();
    let record = manager.issue(EMAIL, Purpose::PasswordReset).await.unwrap();
    let action = Arc::new(SlowAction::default());

    let mut handles = Vec::new();
    for _ in 0..16 {
        let manager = manager.clone();
        let action = action.clone();
        let token = record.token.clone();
        handles.push(tokio::spawn(async move {
            manager.consume(EMAIL, &token, &*action).await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(e) => assert_eq!(e.kind(), ErrorKind::PermissionDenied),
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(action.calls.load(Ordering::SeqCst), 1);
}

/// 并发的"验证并标记"只有一个成功，其余被拒绝
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_mark_as_used_single_winner() {
    let (manager, _) = manager_with_clock();
    let record = manager.issue(EMAIL, Purpose::Activation).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..32 {
        let manager = manager.clone();
        let token = record.token.clone();
        handles.push(tokio::spawn(async move {
            manager.validate(EMAIL, &token, true).await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(validation) => {
                assert!(validation.marked_used);
                succeeded += 1;
            }
            Err(e) => assert_eq!(e.kind(), ErrorKind::PermissionDenied),
        }
    }

    assert_eq!(succeeded, 1);
    let stored = manager.store().get(&record.token).await.unwrap().unwrap();
    assert!(stored.is_used);
}

/// "验证并标记"与消费并发：消费总能完成且操作只执行一次
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mark_as_used_races_consume() {
    let (manager, _) = manager_with_clock();

    for _ in 0..20 {
        let record = manager.issue(EMAIL, Purpose::PasswordReset).await.unwrap();
        let action = Arc::new(SlowAction::default());

        let validating = {
            let manager = manager.clone();
            let token = record.token.clone();
            tokio::spawn(async move { manager.validate(EMAIL, &token, true).await })
        };
        let consuming = {
            let manager = manager.clone();
            let action = action.clone();
            let token = record.token.clone();
            tokio::spawn(async move { manager.consume(EMAIL, &token, &*action).await })
        };

        if let Err(e) = validating.await.unwrap() {
            assert_eq!(e.kind(), ErrorKind::PermissionDenied);
        }
        consuming.await.unwrap().unwrap();
        assert_eq!(action.calls.load(Ordering::SeqCst), 1);

        let stored = manager.store().get(&record.token).await.unwrap().unwrap();
        assert!(stored.is_used);
        assert!(stored.consumed_at.is_some());
    }
}

/// 验证并标记后仍可消费一次，之后不能再消费
#[tokio::test]
async fn test_mark_then_consume_once() {
    let (manager, _) = manager_with_clock();
    let record = manager.issue(EMAIL, Purpose::PasswordReset).await.unwrap();
    let action = SlowAction::default();

    manager.validate(EMAIL, &record.token, true).await.unwrap();
    manager.consume(EMAIL, &record.token, &action).await.unwrap();

    let err = manager
        .consume(EMAIL, &record.token, &action)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert_eq!(action.calls.load(Ordering::SeqCst), 1);
}

/// 不同 token 互不影响
#[tokio::test]
async fn test_tokens_are_independent() {
    let (manager, _) = manager_with_clock();
    let a = manager.issue(EMAIL, Purpose::Activation).await.unwrap();
    let b = manager.issue(EMAIL, Purpose::PasswordReset).await.unwrap();
    let action = SlowAction::default();

    manager.consume(EMAIL, &a.token, &action).await.unwrap();

    let stored = manager.store().get(&b.token).await.unwrap().unwrap();
    assert!(!stored.is_used);
    assert!(manager.validate(EMAIL, &b.token, false).await.is_ok());
}
