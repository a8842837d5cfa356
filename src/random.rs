//! 随机数与 token 来源模块
//!
//! 提供 6 位数字 token 的生成，以及可注入的 [`TokenSource`]，
//! 便于在测试中复现冲突场景。

use std::sync::Mutex;

use rand::Rng;

use crate::error::{Error, Result};

/// 6 位 token 的最小值（包含）
pub const TOKEN_MIN: u32 = 100_000;

/// 6 位 token 的最大值（包含）
pub const TOKEN_MAX: u32 = 999_999;

/// 生成指定范围内的随机数
///
/// # Arguments
///
/// * `min` - 最小值（包含）
/// * `max` - 最大值（包含）
///
/// # Returns
///
/// 返回 [min, max] 范围内均匀分布的随机数
///
/// # Panics
///
/// `min > max` 时 panic。
pub fn generate_random_in_range(min: u32, max: u32) -> u32 {
    assert!(min <= max, "empty range: {min} > {max}");
    rand::rng().random_range(min..=max)
}

/// 生成 6 位数字 token
///
/// 取值范围 [100000, 999999]，因此结果总是 6 个字符且没有前导零。
///
/// # Example
///
/// ```rust
/// use campus_otp::random::generate_six_digit_token;
///
/// let token = generate_six_digit_token();
/// assert_eq!(token.len(), 6);
/// assert!(token.chars().all(|c| c.is_ascii_digit()));
/// ```
pub fn generate_six_digit_token() -> String {
    generate_random_in_range(TOKEN_MIN, TOKEN_MAX).to_string()
}

/// 常量时间比较两个字节切片
///
/// # Example
///
/// ```rust
/// use campus_otp::random::constant_time_compare;
///
/// assert!(constant_time_compare(b"123456", b"123456"));
/// assert!(!constant_time_compare(b"123456", b"654321"));
/// ```
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}

/// 常量时间比较两个字符串
pub fn constant_time_compare_str(a: &str, b: &str) -> bool {
    constant_time_compare(a.as_bytes(), b.as_bytes())
}

// ============================================================================
// Token 来源
// ============================================================================

/// 候选 token 来源
///
/// 管理器每次尝试签发时取一个候选值；冲突时再取下一个。
pub trait TokenSource: Send + Sync {
    /// 取下一个候选 token
    fn next_token(&self) -> Result<String>;
}

/// 基于线程本地 CSPRNG 的 token 来源
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomTokenSource;

impl TokenSource for RandomTokenSource {
    fn next_token(&self) -> Result<String> {
        Ok(generate_six_digit_token())
    }
}

/// 按固定顺序循环返回预设 token 的来源
///
/// 用于测试冲突和耗尽场景。
#[derive(Debug)]
pub struct SequenceTokenSource {
    tokens: Vec<String>,
    cursor: Mutex<usize>,
}

impl SequenceTokenSource {
    /// 创建新的序列来源
    ///
    /// 列表为空时 [`next_token`](TokenSource::next_token) 返回内部错误。
    pub fn new<I, T>(tokens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
            cursor: Mutex::new(0),
        }
    }
}

impl TokenSource for SequenceTokenSource {
    fn next_token(&self) -> Result<String> {
        if self.tokens.is_empty() {
            return Err(Error::internal("token sequence is empty"));
        }
        let mut cursor = self
            .cursor
            .lock()
            .map_err(|_| Error::internal("token sequence lock poisoned"))?;
        let token = self.tokens[*cursor % self.tokens.len()].clone();
        *cursor += 1;
        Ok(token)
    }
}
