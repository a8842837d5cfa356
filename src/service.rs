//! 账户操作
//!
//! 在 [`OtpManager`] 之上提供三个请求级操作：签发 token、验证 token、重置密码。
//! 请求和响应结构与传输层无关（HTTP、RPC 都可以直接序列化），字段使用 camelCase，
//! 时间戳为 Unix 毫秒。
//!
//! 所有请求字段检查都在访问存储之前完成，检查失败不会修改任何记录。
//!
//! ## 示例
//!
//! ```rust
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! use std::sync::Arc;
//! use campus_otp::identity::InMemoryIdentityProvider;
//! use campus_otp::otp::OtpManager;
//! use campus_otp::service::{AccountService, IssueTokenRequest, ResetPasswordRequest};
//!
//! let identity = InMemoryIdentityProvider::new();
//! identity.add_user("uid-1", "aluno@cs.udf.edu.br").unwrap();
//!
//! let service = AccountService::new(Arc::new(OtpManager::with_default_config()), identity);
//!
//! let issued = service
//!     .issue_token(IssueTokenRequest {
//!         email: Some("aluno@cs.udf.edu.br".into()),
//!         purpose: Some("password_reset".into()),
//!     })
//!     .await
//!     .unwrap();
//!
//! let reset = service
//!     .reset_password(ResetPasswordRequest {
//!         email: Some("aluno@cs.udf.edu.br".into()),
//!         token: Some(issued.token),
//!         new_password: Some("nova-senha-123".into()),
//!     })
//!     .await
//!     .unwrap();
//! assert!(reset.success);
//! # });
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::config::PasswordPolicy;
use crate::error::{Error, ErrorKind, Result};
use crate::identity::{IdentityProvider, InMemoryIdentityProvider, PasswordResetAction};
use crate::notify::{CodeNotifier, NoopNotifier};
use crate::otp::{InMemoryTokenStore, OtpManager, Purpose, TokenStore};

// ============================================================================
// 请求与响应
// ============================================================================

/// 签发 token 请求
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IssueTokenRequest {
    /// 机构邮箱
    pub email: Option<String>,
    /// `activation`（默认）或 `password_reset`
    pub purpose: Option<String>,
}

/// 签发 token 响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueTokenResponse {
    pub success: bool,
    pub token: String,
    pub email: String,
    pub purpose: Purpose,
    pub is_used: bool,
    /// Unix 毫秒
    pub created_at: i64,
    /// Unix 毫秒
    pub expires_at: i64,
}

/// 验证 token 请求
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidateTokenRequest {
    pub email: Option<String>,
    pub token: Option<String>,
    /// 验证成功后是否标记为已使用，默认 `false`
    pub mark_as_used: bool,
}

/// 验证 token 响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateTokenResponse {
    pub success: bool,
    pub is_valid: bool,
    pub token: String,
    pub email: String,
    pub purpose: Purpose,
    /// Unix 毫秒
    pub expires_at: i64,
}

/// 重置密码请求
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResetPasswordRequest {
    pub email: Option<String>,
    pub token: Option<String>,
    pub new_password: Option<String>,
}

/// 重置密码响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordResponse {
    pub success: bool,
    pub message: String,
}

/// 错误响应
///
/// 只包含稳定的类别、原因代码和面向用户的消息，不包含内部细节。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    /// 仅验证接口返回
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_valid: Option<bool>,
    /// 错误类别，例如 `permission-denied`
    pub kind: ErrorKind,
    /// 原因代码，例如 `token_used`
    pub error: String,
    pub message: String,
    /// 建议的 HTTP 状态码
    #[serde(skip)]
    pub status: u16,
}

impl ErrorResponse {
    /// 从错误构建响应
    ///
    /// 内部错误在这里记录完整信息，响应中只保留通用提示。
    pub fn from_error(err: &Error) -> Self {
        let kind = err.kind();
        if kind == ErrorKind::Internal {
            error!(error = %err, "request failed with an internal error");
        }
        Self {
            success: false,
            is_valid: None,
            kind,
            error: err.reason().to_string(),
            message: err.public_message(),
            status: kind.http_status(),
        }
    }

    /// 验证接口的错误响应，附带 `isValid: false`
    pub fn for_validation(err: &Error) -> Self {
        Self {
            is_valid: Some(false),
            ..Self::from_error(err)
        }
    }
}

impl From<&Error> for ErrorResponse {
    fn from(err: &Error) -> Self {
        Self::from_error(err)
    }
}

// ============================================================================
// 账户服务
// ============================================================================

/// 账户服务
pub struct AccountService<S = InMemoryTokenStore, P = InMemoryIdentityProvider>
where
    S: TokenStore,
    P: IdentityProvider,
{
    manager: Arc<OtpManager<S>>,
    identity: P,
    notifier: Arc<dyn CodeNotifier>,
    passwords: PasswordPolicy,
}

impl<S: TokenStore, P: IdentityProvider> AccountService<S, P> {
    /// 创建服务，默认不投递验证码
    pub fn new(manager: Arc<OtpManager<S>>, identity: P) -> Self {
        Self {
            manager,
            identity,
            notifier: Arc::new(NoopNotifier),
            passwords: PasswordPolicy::default(),
        }
    }

    /// 设置验证码投递
    pub fn with_notifier(mut self, notifier: Arc<dyn CodeNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// 设置密码策略
    pub fn with_password_policy(mut self, policy: PasswordPolicy) -> Self {
        self.passwords = policy;
        self
    }

    /// 获取 token 管理器
    pub fn manager(&self) -> &Arc<OtpManager<S>> {
        &self.manager
    }

    /// 获取身份提供方
    pub fn identity(&self) -> &P {
        &self.identity
    }

    /// 签发 token
    pub async fn issue_token(&self, request: IssueTokenRequest) -> Result<IssueTokenResponse> {
        let email = required(request.email, "email")?;
        self.manager.config().domain.check(&email)?;
        let purpose = match request.purpose.as_deref() {
            None => Purpose::default(),
            Some(raw) => raw.parse()?,
        };

        let record = self.manager.issue(&email, purpose).await?;

        if let Err(e) = self.notifier.send_code(&record).await {
            warn!(email = %record.email, error = %e, "code delivery failed, token stays valid");
        }

        Ok(IssueTokenResponse {
            success: true,
            token: record.token,
            email: record.email,
            purpose: record.purpose,
            is_used: record.is_used,
            created_at: record.created_at.timestamp_millis(),
            expires_at: record.expires_at.timestamp_millis(),
        })
    }

    /// 验证 token
    pub async fn validate_token(
        &self,
        request: ValidateTokenRequest,
    ) -> Result<ValidateTokenResponse> {
        let email = required(request.email, "email")?;
        let token = required(request.token, "token")?;
        self.manager.config().domain.check(&email)?;

        let validation = self
            .manager
            .validate(&email, &token, request.mark_as_used)
            .await?;

        Ok(ValidateTokenResponse {
            success: true,
            is_valid: true,
            token: validation.token,
            email: validation.email,
            purpose: validation.purpose,
            expires_at: validation.expires_at.timestamp_millis(),
        })
    }

    /// 使用 token 重置密码
    ///
    /// 新密码不满足策略时返回 `InvalidArgument`，不会读取或修改 token。
    pub async fn reset_password(
        &self,
        request: ResetPasswordRequest,
    ) -> Result<ResetPasswordResponse> {
        let email = required(request.email, "email")?;
        let token = required(request.token, "token")?;
        let new_password = required(request.new_password, "newPassword")?;
        self.manager.config().domain.check(&email)?;
        self.passwords.check(&new_password)?;

        let action = PasswordResetAction::new(&self.identity, &new_password);
        self.manager.consume(&email, &token, &action).await?;

        Ok(ResetPasswordResponse {
            success: true,
            message: "password updated".to_string(),
        })
    }
}

/// 缺失或为空的字段视为缺失
fn required(value: Option<String>, field: &str) -> Result<String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::missing(field)),
    }
}
