//! # campus_otp
//!
//! 机构账户激活与密码重置的一次性 token 库。
//!
//! ## 功能特性
//!
//! - **签发**: 生成 6 位数字 token，原子写入，冲突时有限次重试
//! - **验证**: 固定顺序的检查（存在、邮箱、未使用、未过期），可选同时标记为已使用
//! - **消费**: 检查通过后执行一次受保护操作（如设置新密码），操作失败不消耗 token
//! - **过期**: 读取时按时钟计算，后台任务定期清理
//! - **机构域名**: 只接受配置的邮箱后缀
//!
//! ## Features
//!
//! - `telemetry` - 提供 `tracing-subscriber` 日志初始化（默认启用）
//!
//! ## 设计原则
//!
//! 本库只负责 token 的生命周期和请求级检查，**不包含**传输层（HTTP/RPC）、
//! 邮件发送和身份提供方的具体实现。存储、身份提供方、验证码投递都通过 trait 注入。
//!
//! ## 示例
//!
//! ```rust
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! use campus_otp::{OtpConfig, OtpManager, Purpose};
//!
//! let manager = OtpManager::new(OtpConfig::default()).unwrap();
//!
//! let record = manager
//!     .issue("aluno@cs.udf.edu.br", Purpose::Activation)
//!     .await
//!     .unwrap();
//! assert_eq!(record.token.len(), 6);
//! assert!(!record.is_used);
//!
//! let validation = manager
//!     .validate("aluno@cs.udf.edu.br", &record.token, false)
//!     .await
//!     .unwrap();
//! assert_eq!(validation.expires_at, record.expires_at);
//! # });
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod identity;
pub mod notify;
pub mod otp;
pub mod random;
pub mod service;
#[cfg(feature = "telemetry")]
pub mod telemetry;

pub use error::{Error, ErrorKind, Result};

// ============================================================================
// 配置与依赖导出
// ============================================================================

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DomainPolicy, OtpConfig, PasswordPolicy};
pub use random::{RandomTokenSource, SequenceTokenSource, TokenSource};

// ============================================================================
// Token 相关导出
// ============================================================================

pub use otp::{
    Consumption, InMemoryTokenStore, OtpManager, Purpose, TokenAction, TokenRecord, TokenState,
    TokenStore, Validation, spawn_sweeper,
};

// ============================================================================
// 协作方与账户服务导出
// ============================================================================

pub use identity::{IdentityProvider, InMemoryIdentityProvider, PasswordResetAction, UserRecord};
pub use notify::{CodeNotifier, NoopNotifier};
pub use service::{
    AccountService, ErrorResponse, IssueTokenRequest, IssueTokenResponse, ResetPasswordRequest,
    ResetPasswordResponse, ValidateTokenRequest, ValidateTokenResponse,
};
