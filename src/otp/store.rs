//! Token 存储接口
//!
//! 存储必须提供两个原子原语：
//!
//! - `create_if_absent`: 仅当键不存在时写入，用于签发时避免冲突覆盖
//! - `compare_and_swap`: 仅当当前记录与读取时一致时替换，用于状态变更
//!
//! 文档数据库可以用事务或前置条件实现，Redis 可以用 `SET NX` 与 Lua 脚本实现。

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::record::TokenRecord;
use crate::error::{Result, StorageError};

// ============================================================================
// 存储接口
// ============================================================================

/// Token 存储接口
///
/// 实现此 trait 以提供自定义的存储后端（如文档数据库、Redis 等）
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// 仅当 `record.token` 不存在时保存，返回是否写入
    async fn create_if_absent(&self, record: TokenRecord) -> Result<bool>;

    /// 按 token 获取记录
    async fn get(&self, token: &str) -> Result<Option<TokenRecord>>;

    /// 仅当存储中的记录仍等于 `expected` 时替换为 `replacement`，返回是否替换
    async fn compare_and_swap(
        &self,
        expected: &TokenRecord,
        replacement: TokenRecord,
    ) -> Result<bool>;

    /// 删除 `now` 时刻已过期的记录，返回删除数量
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}

// ============================================================================
// 内存存储实现
// ============================================================================

/// 内存存储实现
///
/// 适用于单实例部署或测试环境。
/// 每个操作都在一次加锁内完成，因此两个原语都是原子的。
#[derive(Debug, Clone, Default)]
pub struct InMemoryTokenStore {
    /// token -> 记录
    records: Arc<RwLock<HashMap<String, TokenRecord>>>,
}

impl InMemoryTokenStore {
    /// 创建新的内存存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取当前存储的记录数量
    pub fn len(&self) -> usize {
        self.read().map(|records| records.len()).unwrap_or(0)
    }

    /// 检查存储是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, TokenRecord>>> {
        self.records
            .read()
            .map_err(|_| StorageError::LockPoisoned.into())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, TokenRecord>>> {
        self.records
            .write()
            .map_err(|_| StorageError::LockPoisoned.into())
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn create_if_absent(&self, record: TokenRecord) -> Result<bool> {
        let mut records = self.write()?;
        if records.contains_key(&record.token) {
            return Ok(false);
        }
        records.insert(record.token.clone(), record);
        Ok(true)
    }

    async fn get(&self, token: &str) -> Result<Option<TokenRecord>> {
        let records = self.read()?;
        Ok(records.get(token).cloned())
    }

    async fn compare_and_swap(
        &self,
        expected: &TokenRecord,
        replacement: TokenRecord,
    ) -> Result<bool> {
        let mut records = self.write()?;
        match records.get_mut(&expected.token) {
            Some(current) if current == expected => {
                *current = replacement;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut records = self.write()?;
        let before = records.len();
        records.retain(|_, record| !record.is_expired_at(now));
        Ok(before - records.len())
    }
}
