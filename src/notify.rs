//! 验证码投递
//!
//! 本 crate 不包含邮件发送实现。应用层实现 [`CodeNotifier`]，
//! 接入 SMTP、EmailJS 等服务。投递失败不会让签发失败：token 的有效性不依赖投递结果。

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::otp::TokenRecord;

/// 验证码投递接口
#[async_trait]
pub trait CodeNotifier: Send + Sync {
    /// 将刚签发的 token 发送给 `record.email`
    async fn send_code(&self, record: &TokenRecord) -> Result<()>;
}

/// 不发送任何内容的投递实现
///
/// 适用于由客户端自行发送邮件的部署方式。
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl CodeNotifier for NoopNotifier {
    async fn send_code(&self, record: &TokenRecord) -> Result<()> {
        debug!(email = %record.email, purpose = %record.purpose, "code delivery skipped");
        Ok(())
    }
}
