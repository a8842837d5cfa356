//! 统一错误类型模块
//!
//! 提供 campus_otp 中所有操作的错误类型定义。
//!
//! 每个错误都映射到一个稳定的 [`ErrorKind`]（调用方据此决定响应码）
//! 和一个稳定的 `reason` 字符串（客户端据此区分具体原因）。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// campus_otp 的统一结果类型
pub type Result<T> = std::result::Result<T, Error>;

/// campus_otp 的错误类型
#[derive(Debug, Error)]
pub enum Error {
    /// 请求字段验证错误
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Token 状态错误
    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    /// 身份提供方错误
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    /// 存储错误
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// 配置错误
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// 在尝试次数内无法生成唯一 token
    #[error("could not generate a unique token after {attempts} attempts")]
    ResourceExhausted {
        /// 已尝试次数
        attempts: u32,
    },

    /// 内部错误
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 创建一个内部错误
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// 创建一个字段缺失错误
    pub fn missing(field: impl Into<String>) -> Self {
        Error::Validation(ValidationError::EmptyField(field.into()))
    }

    /// 创建一个存储错误
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(StorageError::OperationFailed(msg.into()))
    }

    /// 错误类别
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::InvalidArgument,
            Error::Token(e) => e.kind(),
            Error::Identity(IdentityError::UserNotFound(_)) => ErrorKind::NotFound,
            Error::Identity(IdentityError::Provider(_)) => ErrorKind::Internal,
            Error::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            Error::Storage(_) | Error::Config(_) | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// 稳定的原因代码，供客户端区分同一类别下的不同情况
    pub fn reason(&self) -> &'static str {
        match self {
            Error::Validation(e) => match e {
                ValidationError::EmptyField(_) => "missing_fields",
                ValidationError::InvalidEmail(_) => "invalid_email",
                ValidationError::InvalidPurpose(_) => "invalid_purpose",
                ValidationError::PasswordTooShort { .. } => "weak_password",
            },
            Error::Token(e) => match e {
                TokenError::NotFound => "token_not_found",
                TokenError::EmailMismatch => "token_mismatch",
                TokenError::AlreadyUsed | TokenError::AlreadyConsumed => "token_used",
                TokenError::InProgress => "token_in_use",
                TokenError::Expired => "token_expired",
            },
            Error::Identity(IdentityError::UserNotFound(_)) => "user_not_found",
            Error::ResourceExhausted { .. } => "resource_exhausted",
            Error::Identity(IdentityError::Provider(_))
            | Error::Storage(_)
            | Error::Config(_)
            | Error::Internal(_) => "internal_error",
        }
    }

    /// 面向用户的消息
    ///
    /// 内部错误只返回通用提示，不暴露存储或提供方的细节。
    pub fn public_message(&self) -> String {
        match self {
            Error::Validation(e) => e.to_string(),
            Error::Token(e) => e.to_string(),
            Error::Identity(e @ IdentityError::UserNotFound(_)) => e.to_string(),
            Error::ResourceExhausted { .. } => {
                "could not generate a unique token, please try again".to_string()
            }
            _ => "internal error, please try again later".to_string(),
        }
    }
}

/// 错误类别
///
/// 序列化为 RPC 风格的状态码，例如 `invalid-argument`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// 字段缺失或格式错误、邮箱域名不符、用途无效、密码过短
    InvalidArgument,
    /// token 不存在或身份提供方中无此用户
    NotFound,
    /// 邮箱与 token 不匹配，或 token 已被使用
    PermissionDenied,
    /// token 已过期
    DeadlineExceeded,
    /// token 空间冲突耗尽
    ResourceExhausted,
    /// 存储或提供方的意外错误
    Internal,
}

impl ErrorKind {
    /// 对应的 HTTP 状态码
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::InvalidArgument => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::PermissionDenied | ErrorKind::DeadlineExceeded => 403,
            ErrorKind::ResourceExhausted | ErrorKind::Internal => 500,
        }
    }

    /// 状态码字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid-argument",
            ErrorKind::NotFound => "not-found",
            ErrorKind::PermissionDenied => "permission-denied",
            ErrorKind::DeadlineExceeded => "deadline-exceeded",
            ErrorKind::ResourceExhausted => "resource-exhausted",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 请求字段验证错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// 字段为空
    #[error("field '{0}' is required")]
    EmptyField(String),
    /// 邮箱不属于允许的机构域名
    #[error("only {0} email addresses are allowed")]
    InvalidEmail(String),
    /// 无效的 token 用途
    #[error("invalid purpose '{0}', use \"activation\" or \"password_reset\"")]
    InvalidPurpose(String),
    /// 密码太短
    #[error("password too short: minimum {min_length} characters, got {actual}")]
    PasswordTooShort { min_length: usize, actual: usize },
}

/// Token 状态错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Token 不存在
    #[error("token is invalid or was not found")]
    NotFound,
    /// Token 与邮箱不匹配
    #[error("token does not match the given email")]
    EmailMismatch,
    /// Token 已被使用
    #[error("token has already been used")]
    AlreadyUsed,
    /// Token 已完成一次受保护操作
    #[error("token has already been redeemed")]
    AlreadyConsumed,
    /// 另一个请求正在使用该 token
    #[error("token is being redeemed by another request")]
    InProgress,
    /// Token 已过期
    #[error("token has expired, request a new code")]
    Expired,
}

impl TokenError {
    /// 错误类别
    pub fn kind(&self) -> ErrorKind {
        match self {
            TokenError::NotFound => ErrorKind::NotFound,
            TokenError::Expired => ErrorKind::DeadlineExceeded,
            TokenError::EmailMismatch
            | TokenError::AlreadyUsed
            | TokenError::AlreadyConsumed
            | TokenError::InProgress => ErrorKind::PermissionDenied,
        }
    }
}

/// 身份提供方错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// 没有该邮箱对应的用户
    #[error("no user found for {0}")]
    UserNotFound(String),
    /// 提供方调用失败
    #[error("identity provider failure: {0}")]
    Provider(String),
}

/// 存储相关错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// 锁已中毒
    #[error("storage lock poisoned")]
    LockPoisoned,
    /// 操作失败
    #[error("storage operation failed: {0}")]
    OperationFailed(String),
}

/// 配置相关错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// 无效的配置值
    #[error("invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Token(TokenError::Expired);
        assert_eq!(
            err.to_string(),
            "Token error: token has expired, request a new code"
        );
    }

    #[test]
    fn test_token_error_kinds() {
        assert_eq!(TokenError::NotFound.kind(), ErrorKind::NotFound);
        assert_eq!(TokenError::EmailMismatch.kind(), ErrorKind::PermissionDenied);
        assert_eq!(TokenError::AlreadyUsed.kind(), ErrorKind::PermissionDenied);
        assert_eq!(TokenError::Expired.kind(), ErrorKind::DeadlineExceeded);
    }

    #[test]
    fn test_identity_error_kinds() {
        let missing: Error = IdentityError::UserNotFound("a@cs.udf.edu.br".into()).into();
        assert_eq!(missing.kind(), ErrorKind::NotFound);
        assert_eq!(missing.reason(), "user_not_found");

        let failed: Error = IdentityError::Provider("timeout".into()).into();
        assert_eq!(failed.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err = Error::storage("collection activationTokens unreachable");
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(!err.public_message().contains("activationTokens"));
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::PasswordTooShort {
            min_length: 8,
            actual: 4,
        };
        assert_eq!(
            err.to_string(),
            "password too short: minimum 8 characters, got 4"
        );
    }

    #[test]
    fn test_error_kind_codes() {
        assert_eq!(ErrorKind::InvalidArgument.to_string(), "invalid-argument");
        assert_eq!(ErrorKind::DeadlineExceeded.http_status(), 403);
        assert_eq!(
            serde_json::to_string(&ErrorKind::ResourceExhausted).unwrap(),
            "\"resource-exhausted\""
        );
    }
}
