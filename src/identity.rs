//! 身份提供方
//!
//! 密码重置需要的两个能力：按邮箱查找用户、设置用户密码。
//! token 管理器本身不依赖此模块，只有 [`PasswordResetAction`] 使用它。

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, IdentityError, Result};
use crate::otp::TokenAction;

/// 身份提供方中的用户
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// 用户 ID
    pub uid: String,
    /// 邮箱
    pub email: String,
}

/// 身份提供方接口
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// 按邮箱查找用户
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>>;

    /// 设置用户密码
    async fn set_password(&self, uid: &str, new_password: &str) -> Result<()>;
}

// ============================================================================
// 内存实现
// ============================================================================

#[derive(Debug, Clone)]
struct StoredUser {
    record: UserRecord,
    password: Option<String>,
}

/// 内存身份提供方
///
/// 适用于开发和测试环境。密码以明文保存在内存中，仅用于断言。
#[derive(Debug, Clone, Default)]
pub struct InMemoryIdentityProvider {
    /// email -> 用户
    users: Arc<RwLock<HashMap<String, StoredUser>>>,
}

impl InMemoryIdentityProvider {
    /// 创建新的内存身份提供方
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加用户
    pub fn add_user(&self, uid: impl Into<String>, email: impl Into<String>) -> Result<UserRecord> {
        let record = UserRecord {
            uid: uid.into(),
            email: email.into(),
        };
        let mut users = self
            .users
            .write()
            .map_err(|_| IdentityError::Provider("user table lock poisoned".into()))?;
        users.insert(
            record.email.clone(),
            StoredUser {
                record: record.clone(),
                password: None,
            },
        );
        Ok(record)
    }

    /// 获取用户当前密码
    pub fn password_of(&self, email: &str) -> Option<String> {
        self.users
            .read()
            .ok()
            .and_then(|users| users.get(email).and_then(|u| u.password.clone()))
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let users = self
            .users
            .read()
            .map_err(|_| IdentityError::Provider("user table lock poisoned".into()))?;
        Ok(users.get(email).map(|u| u.record.clone()))
    }

    async fn set_password(&self, uid: &str, new_password: &str) -> Result<()> {
        let mut users = self
            .users
            .write()
            .map_err(|_| IdentityError::Provider("user table lock poisoned".into()))?;
        let user = users
            .values_mut()
            .find(|u| u.record.uid == uid)
            .ok_or_else(|| IdentityError::UserNotFound(uid.to_string()))?;
        user.password = Some(new_password.to_string());
        Ok(())
    }
}

// ============================================================================
// 密码重置操作
// ============================================================================

/// 设置新密码的受保护操作
pub struct PasswordResetAction<'a, P: IdentityProvider + ?Sized> {
    provider: &'a P,
    new_password: &'a str,
}

impl<'a, P: IdentityProvider + ?Sized> PasswordResetAction<'a, P> {
    /// 创建操作
    pub fn new(provider: &'a P, new_password: &'a str) -> Self {
        Self {
            provider,
            new_password,
        }
    }
}

#[async_trait]
impl<'a, P: IdentityProvider + ?Sized> TokenAction for PasswordResetAction<'a, P> {
    async fn apply(&self, email: &str) -> Result<()> {
        let user = self
            .provider
            .find_user_by_email(email)
            .await
            .map_err(into_provider_error)?
            .ok_or_else(|| IdentityError::UserNotFound(email.to_string()))?;

        self.provider
            .set_password(&user.uid, self.new_password)
            .await
            .map_err(into_provider_error)
    }
}

/// 除"用户不存在"外，提供方的错误都视为内部错误
fn into_provider_error(err: Error) -> Error {
    match err {
        Error::Identity(_) => err,
        other => IdentityError::Provider(other.to_string()).into(),
    }
}
