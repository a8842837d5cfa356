//! 配置模块
//!
//! 所有策略值（有效期、生成尝试次数、机构邮箱域名、最短密码长度）都是配置项，
//! 在进程启动时构建一次。无效配置在构建时报错，而不是在每个请求中检查。
//!
//! ## 示例
//!
//! ```rust
//! use campus_otp::config::{DomainPolicy, OtpConfig};
//! use std::time::Duration;
//!
//! let config = OtpConfig::default()
//!     .with_ttl(Duration::from_secs(15 * 60))
//!     .with_max_generation_attempts(5)
//!     .with_domain(DomainPolicy::new("@example.edu").unwrap());
//!
//! assert!(config.domain.matches("aluno@example.edu"));
//! ```

use std::str::FromStr;
use std::time::Duration;

use crate::error::{ConfigError, Error, Result, ValidationError};

/// 默认的机构邮箱后缀
pub const DEFAULT_EMAIL_DOMAIN: &str = "@cs.udf.edu.br";

/// token 有效期上限（一年）
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// 环境变量：机构邮箱后缀
pub const ENV_EMAIL_DOMAIN: &str = "OTP_EMAIL_DOMAIN";
/// 环境变量：token 有效期（分钟）
pub const ENV_TTL_MINUTES: &str = "OTP_TTL_MINUTES";
/// 环境变量：最大生成尝试次数
pub const ENV_MAX_ATTEMPTS: &str = "OTP_MAX_ATTEMPTS";
/// 环境变量：最短密码长度
pub const ENV_MIN_PASSWORD_LENGTH: &str = "OTP_MIN_PASSWORD_LENGTH";

// ============================================================================
// 邮箱域名策略
// ============================================================================

/// 机构邮箱域名谓词
///
/// 邮箱必须以配置的后缀结尾，且后缀前至少有一个字符。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainPolicy {
    suffix: String,
}

impl DomainPolicy {
    /// 创建域名策略
    ///
    /// 不带 `@` 的域名会自动补上，例如 `cs.udf.edu.br` 变为 `@cs.udf.edu.br`。
    pub fn new(suffix: impl Into<String>) -> Result<Self> {
        let suffix = suffix.into();
        let suffix = suffix.trim();
        if suffix.is_empty() || suffix == "@" {
            return Err(ConfigError::InvalidValue {
                key: ENV_EMAIL_DOMAIN.to_string(),
                message: "email domain cannot be empty".to_string(),
            }
            .into());
        }
        let suffix = if suffix.starts_with('@') {
            suffix.to_string()
        } else {
            format!("@{}", suffix)
        };
        Ok(Self { suffix })
    }

    /// 配置的后缀
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// 邮箱是否属于该机构
    pub fn matches(&self, email: &str) -> bool {
        email.len() > self.suffix.len() && email.ends_with(&self.suffix)
    }

    /// 检查邮箱，不符合时返回 `InvalidArgument`
    pub fn check(&self, email: &str) -> Result<()> {
        if email.is_empty() {
            return Err(Error::missing("email"));
        }
        if !self.matches(email) {
            return Err(ValidationError::InvalidEmail(self.suffix.clone()).into());
        }
        Ok(())
    }
}

impl Default for DomainPolicy {
    fn default() -> Self {
        Self {
            suffix: DEFAULT_EMAIL_DOMAIN.to_string(),
        }
    }
}

// ============================================================================
// OTP 配置
// ============================================================================

/// OTP 配置
#[derive(Debug, Clone)]
pub struct OtpConfig {
    /// token 有效期
    pub ttl: Duration,

    /// 签发时的最大生成尝试次数（每次冲突消耗一次）
    pub max_generation_attempts: u32,

    /// 机构邮箱域名
    pub domain: DomainPolicy,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30 * 60), // 30 分钟
            max_generation_attempts: 10,
            domain: DomainPolicy::default(),
        }
    }
}

impl OtpConfig {
    /// 创建新配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置有效期
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// 设置最大生成尝试次数
    pub fn with_max_generation_attempts(mut self, attempts: u32) -> Self {
        self.max_generation_attempts = attempts;
        self
    }

    /// 设置机构邮箱域名
    pub fn with_domain(mut self, domain: DomainPolicy) -> Self {
        self.domain = domain;
        self
    }

    /// 检查配置是否可用
    pub fn validate(&self) -> Result<()> {
        if self.ttl.is_zero() {
            return Err(invalid(ENV_TTL_MINUTES, "validity window must be positive"));
        }
        if self.ttl > MAX_TTL {
            return Err(invalid(ENV_TTL_MINUTES, "validity window is too large"));
        }
        if self.max_generation_attempts == 0 {
            return Err(invalid(ENV_MAX_ATTEMPTS, "at least one attempt is required"));
        }
        Ok(())
    }

    /// 从环境变量读取配置，未设置的项使用默认值
    ///
    /// - `OTP_EMAIL_DOMAIN`: 机构邮箱后缀
    /// - `OTP_TTL_MINUTES`: 有效期（分钟）
    /// - `OTP_MAX_ATTEMPTS`: 最大生成尝试次数
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 从任意键值来源读取配置
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(domain) = lookup(ENV_EMAIL_DOMAIN) {
            config.domain = DomainPolicy::new(domain)?;
        }
        if let Some(minutes) = parse_var::<u64>(&lookup, ENV_TTL_MINUTES)? {
            config.ttl = Duration::from_secs(minutes.saturating_mul(60));
        }
        if let Some(attempts) = parse_var::<u32>(&lookup, ENV_MAX_ATTEMPTS)? {
            config.max_generation_attempts = attempts;
        }

        config.validate()?;
        Ok(config)
    }
}

// ============================================================================
// 密码策略
// ============================================================================

/// 重置密码时的密码要求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordPolicy {
    /// 最小长度（按字符计）
    pub min_length: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self { min_length: 8 }
    }
}

impl PasswordPolicy {
    /// 设置最小长度
    pub fn with_min_length(mut self, length: usize) -> Self {
        self.min_length = length;
        self
    }

    /// 检查新密码
    pub fn check(&self, password: &str) -> Result<()> {
        let actual = password.chars().count();
        if actual < self.min_length {
            return Err(ValidationError::PasswordTooShort {
                min_length: self.min_length,
                actual,
            }
            .into());
        }
        Ok(())
    }

    /// 从环境变量 `OTP_MIN_PASSWORD_LENGTH` 读取
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 从任意键值来源读取
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut policy = Self::default();
        if let Some(length) = parse_var::<usize>(&lookup, ENV_MIN_PASSWORD_LENGTH)? {
            if length == 0 {
                return Err(invalid(
                    ENV_MIN_PASSWORD_LENGTH,
                    "minimum length must be positive",
                ));
            }
            policy.min_length = length;
        }
        Ok(policy)
    }
}

// ============================================================================
// 辅助函数
// ============================================================================

fn invalid(key: &str, message: &str) -> Error {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
    .into()
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| invalid(key, &format!("'{}' is not a valid number", raw))),
    }
}
