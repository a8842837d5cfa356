//! 一次性 token (OTP) 模块
//!
//! 管理用于账户激活和密码重置的 6 位数字 token 的完整生命周期。
//!
//! ## 状态机
//!
//! ```text
//! Created(未使用) ──validate(.., false)──▶ Created(未使用)
//!        │
//!        ├──validate(.., true)──▶ Used
//!        └──consume(..)────────▶ Used
//!
//! 任意状态 ──超过 expires_at──▶ Expired（读取时计算，不存储）
//! ```
//!
//! `Used` 和 `Expired` 都是终态。
//!
//! ## 两种使用策略
//!
//! - [`OtpManager::validate`] 严格拒绝已使用的 token
//! - [`OtpManager::consume`] 容忍已被 `validate(.., true)` 标记的 token，
//!   但保证受保护操作最多执行一次
//!
//! ## 示例
//!
//! ```rust
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! use async_trait::async_trait;
//! use campus_otp::otp::{OtpManager, Purpose, TokenAction};
//!
//! struct ActivateAccount;
//!
//! #[async_trait]
//! impl TokenAction for ActivateAccount {
//!     async fn apply(&self, email: &str) -> campus_otp::Result<()> {
//!         println!("activating {}", email);
//!         Ok(())
//!     }
//! }
//!
//! let manager = OtpManager::with_default_config();
//! let record = manager
//!     .issue("aluno@cs.udf.edu.br", Purpose::Activation)
//!     .await
//!     .unwrap();
//!
//! // 应用层发送验证码（邮件）
//! // send_email(&record.email, &record.token);
//!
//! manager
//!     .consume("aluno@cs.udf.edu.br", &record.token, &ActivateAccount)
//!     .await
//!     .unwrap();
//! # });
//! ```

pub mod manager;
pub mod record;
pub mod store;
mod sweeper;

pub use manager::{Consumption, OtpManager, TokenAction, Validation};
pub use record::{Purpose, TokenRecord, TokenState};
pub use store::{InMemoryTokenStore, TokenStore};
pub use sweeper::spawn_sweeper;
