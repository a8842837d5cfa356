//! Token 记录与用途

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, ValidationError};

// ============================================================================
// Token 用途
// ============================================================================

/// Token 用途
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    /// 账户激活
    #[default]
    Activation,
    /// 密码重置
    PasswordReset,
}

impl Purpose {
    /// 字符串形式
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::Activation => "activation",
            Purpose::PasswordReset => "password_reset",
        }
    }
}

impl std::fmt::Display for Purpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Purpose {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "activation" => Ok(Purpose::Activation),
            "password_reset" => Ok(Purpose::PasswordReset),
            other => Err(ValidationError::InvalidPurpose(other.to_string()).into()),
        }
    }
}

// ============================================================================
// Token 记录
// ============================================================================

/// 持久化的 token 记录
///
/// 存储键就是 `token` 本身。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    /// 6 位数字 token
    pub token: String,

    /// 绑定的邮箱
    pub email: String,

    /// 用途
    pub purpose: Purpose,

    /// 签发时间
    pub created_at: DateTime<Utc>,

    /// 过期时间，恒大于 `created_at`
    pub expires_at: DateTime<Utc>,

    /// 是否已使用
    pub is_used: bool,

    /// 标记为已使用的时间
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_at: Option<DateTime<Utc>>,

    /// 受保护操作完成的时间
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumed_at: Option<DateTime<Utc>>,

    /// 受保护操作进行中的占用标记
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_since: Option<DateTime<Utc>>,
}

impl TokenRecord {
    /// 创建新的未使用记录
    pub fn new(
        token: impl Into<String>,
        email: impl Into<String>,
        purpose: Purpose,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            token: token.into(),
            email: email.into(),
            purpose,
            created_at,
            expires_at: created_at
                .checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            is_used: false,
            used_at: None,
            consumed_at: None,
            pending_since: None,
        }
    }

    /// 在 `now` 时刻是否已过期
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// 在 `now` 时刻的剩余有效秒数
    pub fn remaining_seconds_at(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }

    /// 在 `now` 时刻的派生状态
    ///
    /// 过期优先于已使用：过期不是存储字段，每次读取时重新计算。
    pub fn state_at(&self, now: DateTime<Utc>) -> TokenState {
        if self.is_expired_at(now) {
            TokenState::Expired
        } else if self.is_used {
            TokenState::Used
        } else {
            TokenState::Active
        }
    }
}

/// Token 的派生状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenState {
    /// 未使用且未过期
    Active,
    /// 已使用
    Used,
    /// 已过期
    Expired,
}
