//! OTP 生命周期管理器
//!
//! 负责 token 的签发、验证、一次性消费和过期判断。管理器本身不保存请求间状态，
//! 所有状态都在存储中，每次变更都是一次原子的存储操作。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::record::{Purpose, TokenRecord};
use super::store::{InMemoryTokenStore, TokenStore};
use crate::clock::{Clock, SystemClock};
use crate::config::OtpConfig;
use crate::error::{Error, Result, TokenError};
use crate::random::{RandomTokenSource, TokenSource, constant_time_compare_str};

// ============================================================================
// 受保护操作
// ============================================================================

/// 由 token 授权的受保护操作
///
/// 例如"设置新密码"。[`OtpManager::consume`] 在所有检查通过后调用一次。
/// 操作失败时 token 保持原状，可以修正输入后重试。
#[async_trait]
pub trait TokenAction: Send + Sync {
    /// 对邮箱对应的账户执行操作
    async fn apply(&self, email: &str) -> Result<()>;
}

// ============================================================================
// 结果
// ============================================================================

/// 验证成功的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Validation {
    /// token
    pub token: String,
    /// 绑定的邮箱
    pub email: String,
    /// 用途
    pub purpose: Purpose,
    /// 过期时间
    pub expires_at: DateTime<Utc>,
    /// 本次验证是否已将 token 标记为已使用
    pub marked_used: bool,
}

/// 消费成功的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Consumption {
    /// token
    pub token: String,
    /// 绑定的邮箱
    pub email: String,
    /// 用途
    pub purpose: Purpose,
    /// 操作完成时间
    pub consumed_at: DateTime<Utc>,
}

// ============================================================================
// OTP 管理器
// ============================================================================

/// OTP 管理器
///
/// 在进程启动时构建一次，通过 `Arc` 共享给所有请求。
///
/// ## 示例
///
/// ```rust
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// use campus_otp::config::OtpConfig;
/// use campus_otp::otp::{OtpManager, Purpose};
///
/// let manager = OtpManager::new(OtpConfig::default()).unwrap();
///
/// // 签发
/// let record = manager
///     .issue("aluno@cs.udf.edu.br", Purpose::Activation)
///     .await
///     .unwrap();
///
/// // 仅验证，不消耗
/// manager
///     .validate("aluno@cs.udf.edu.br", &record.token, false)
///     .await
///     .unwrap();
///
/// // 验证并标记为已使用
/// manager
///     .validate("aluno@cs.udf.edu.br", &record.token, true)
///     .await
///     .unwrap();
///
/// // 已使用的 token 不能再次验证
/// assert!(manager
///     .validate("aluno@cs.udf.edu.br", &record.token, false)
///     .await
///     .is_err());
/// # });
/// ```
pub struct OtpManager<S: TokenStore = InMemoryTokenStore> {
    store: S,
    config: OtpConfig,
    clock: Arc<dyn Clock>,
    source: Arc<dyn TokenSource>,
}

impl OtpManager<InMemoryTokenStore> {
    /// 使用默认内存存储创建管理器
    pub fn new(config: OtpConfig) -> Result<Self> {
        Self::with_store(InMemoryTokenStore::new(), config)
    }

    /// 使用默认配置创建管理器
    pub fn with_default_config() -> Self {
        Self::assemble(InMemoryTokenStore::new(), OtpConfig::default())
    }
}

impl<S: TokenStore> OtpManager<S> {
    /// 使用自定义存储创建管理器
    ///
    /// 配置无效时在构建阶段返回错误。
    pub fn with_store(store: S, config: OtpConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(store, config))
    }

    fn assemble(store: S, config: OtpConfig) -> Self {
        Self {
            store,
            config,
            clock: Arc::new(SystemClock),
            source: Arc::new(RandomTokenSource),
        }
    }

    /// 替换时钟
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 替换 token 来源
    pub fn with_token_source(mut self, source: Arc<dyn TokenSource>) -> Self {
        self.source = source;
        self
    }

    /// 获取存储
    pub fn store(&self) -> &S {
        &self.store
    }

    /// 获取配置
    pub fn config(&self) -> &OtpConfig {
        &self.config
    }

    /// 当前时间
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// 签发 token
    ///
    /// 每次尝试都是一次原子的"不存在才创建"；冲突时换一个候选值，
    /// 最多尝试 `max_generation_attempts` 次。
    ///
    /// # Errors
    ///
    /// - 邮箱为空或不属于机构域名：`InvalidArgument`
    /// - 所有尝试都冲突：`ResourceExhausted`
    pub async fn issue(&self, email: &str, purpose: Purpose) -> Result<TokenRecord> {
        self.config.domain.check(email)?;

        let attempts = self.config.max_generation_attempts;
        let created_at = self.clock.now();
        let ttl = chrono::Duration::from_std(self.config.ttl)
            .ok()
            .filter(|ttl| created_at.checked_add_signed(*ttl).is_some())
            .ok_or_else(|| Error::internal("token expiry is out of the representable range"))?;

        for attempt in 1..=attempts {
            let token = self.source.next_token()?;
            let record = TokenRecord::new(token, email, purpose, created_at, ttl);

            if self.store.create_if_absent(record.clone()).await? {
                info!(
                    email,
                    %purpose,
                    expires_at = %record.expires_at,
                    attempt,
                    "token issued"
                );
                return Ok(record);
            }

            debug!(attempt, "token collision, drawing another candidate");
        }

        warn!(email, %purpose, attempts, "could not issue a unique token");
        Err(Error::ResourceExhausted { attempts })
    }

    /// 验证 token
    ///
    /// 按固定顺序检查，第一个失败的检查决定错误：
    ///
    /// 1. 记录存在，否则 `NotFound`
    /// 2. 邮箱匹配，否则 `PermissionDenied`
    /// 3. 未被使用，否则 `PermissionDenied`
    /// 4. 未过期，否则 `DeadlineExceeded`
    ///
    /// `consume_on_success` 为 `true` 时，在同一次原子替换中标记为已使用。
    pub async fn validate(
        &self,
        email: &str,
        token: &str,
        consume_on_success: bool,
    ) -> Result<Validation> {
        let record = self.lookup(token).await?;
        let now = self.clock.now();
        check_validatable(&record, email, now)?;

        if consume_on_success {
            if record.pending_since.is_some() {
                return Err(TokenError::InProgress.into());
            }

            let mut used = record.clone();
            used.is_used = true;
            used.used_at = Some(now);

            if !self.store.compare_and_swap(&record, used).await? {
                // 读取之后记录被并发修改，按最新状态报告
                let current = self.lookup(token).await?;
                check_validatable(&current, email, now)?;
                return Err(TokenError::InProgress.into());
            }

            debug!(email, token, "token marked as used on validation");
        }

        info!(email, marked_used = consume_on_success, "token validated");

        Ok(Validation {
            token: record.token,
            email: record.email,
            purpose: record.purpose,
            expires_at: record.expires_at,
            marked_used: consume_on_success,
        })
    }

    /// 消费 token，执行受保护操作
    ///
    /// 检查存在、邮箱匹配和过期（顺序同 [`validate`](Self::validate) 的 1、2、4），
    /// 但允许 `is_used == true`：之前的 `validate(.., true)` 可能已经标记过它。
    /// 同一个 token 的受保护操作最多执行一次：
    ///
    /// - 操作前原子地占用记录，并发的第二个请求会得到 `PermissionDenied`
    /// - 操作成功后标记 `is_used` 和 `consumed_at`
    /// - 操作失败时释放占用，记录恢复原状
    pub async fn consume<A>(&self, email: &str, token: &str, action: &A) -> Result<Consumption>
    where
        A: TokenAction + ?Sized,
    {
        let mut record = self.lookup(token).await?;
        let now = self.clock.now();
        check_redeemable(&record, email, now)?;

        let claimed = match self.claim(&record, now).await? {
            Some(claimed) => claimed,
            None => {
                // 并发的 validate(.., true) 只会标记 is_used，按最新记录再占用一次
                record = self.lookup(token).await?;
                check_redeemable(&record, email, now)?;
                self.claim(&record, now).await?.ok_or(TokenError::InProgress)?
            }
        };

        if let Err(err) = action.apply(email).await {
            match self.store.compare_and_swap(&claimed, record.clone()).await {
                Ok(true) => {}
                Ok(false) => warn!(email, "token record changed while the action was running"),
                Err(release_err) => {
                    error!(email, error = %release_err, "failed to release token claim")
                }
            }
            debug!(email, error = %err, "guarded action failed, token left unused");
            return Err(err);
        }

        let consumed_at = self.clock.now();
        let mut redeemed = claimed.clone();
        redeemed.pending_since = None;
        redeemed.is_used = true;
        redeemed.used_at = record.used_at.or(Some(consumed_at));
        redeemed.consumed_at = Some(consumed_at);

        if !self.store.compare_and_swap(&claimed, redeemed).await? {
            // 只有清理任务会删除被占用的记录；删除后 token 同样无法再用
            warn!(email, "token record vanished before it could be marked as used");
        }

        info!(email, purpose = %record.purpose, "token redeemed");

        Ok(Consumption {
            token: record.token,
            email: record.email,
            purpose: record.purpose,
            consumed_at,
        })
    }

    /// 清理已过期的记录
    ///
    /// 不在请求路径上调用，由 [`spawn_sweeper`](super::spawn_sweeper) 定期执行。
    pub async fn sweep(&self) -> Result<usize> {
        let removed = self.store.delete_expired(self.clock.now()).await?;
        if removed > 0 {
            info!(removed, "expired tokens swept");
        }
        Ok(removed)
    }

    async fn claim(
        &self,
        record: &TokenRecord,
        now: DateTime<Utc>,
    ) -> Result<Option<TokenRecord>> {
        let mut claimed = record.clone();
        claimed.pending_since = Some(now);

        if self.store.compare_and_swap(record, claimed.clone()).await? {
            Ok(Some(claimed))
        } else {
            Ok(None)
        }
    }

    async fn lookup(&self, token: &str) -> Result<TokenRecord> {
        self.store
            .get(token)
            .await?
            .ok_or_else(|| TokenError::NotFound.into())
    }
}

/// 验证路径的检查：邮箱、未使用、未过期
fn check_validatable(record: &TokenRecord, email: &str, now: DateTime<Utc>) -> Result<()> {
    if !constant_time_compare_str(&record.email, email) {
        return Err(TokenError::EmailMismatch.into());
    }
    if record.is_used {
        return Err(TokenError::AlreadyUsed.into());
    }
    if record.is_expired_at(now) {
        return Err(TokenError::Expired.into());
    }
    Ok(())
}

/// 消费路径的检查：邮箱、未过期、未完成过操作、未被占用
fn check_redeemable(record: &TokenRecord, email: &str, now: DateTime<Utc>) -> Result<()> {
    if !constant_time_compare_str(&record.email, email) {
        return Err(TokenError::EmailMismatch.into());
    }
    if record.is_expired_at(now) {
        return Err(TokenError::Expired.into());
    }
    if record.consumed_at.is_some() {
        return Err(TokenError::AlreadyConsumed.into());
    }
    if record.pending_since.is_some() {
        return Err(TokenError::InProgress.into());
    }
    Ok(())
}
