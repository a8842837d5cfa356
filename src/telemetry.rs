//! 日志初始化
//!
//! 库内部只通过 `tracing` 宏记录事件；进程入口调用 [`init_logging`] 安装输出。
//! token 和密码不会出现在 info 及以上级别的日志中。

use tracing_subscriber::EnvFilter;

/// 默认日志过滤规则
pub const DEFAULT_FILTER: &str = "campus_otp=info";

/// 安装 fmt 日志输出
///
/// 过滤规则优先读取 `RUST_LOG`，未设置时使用 [`DEFAULT_FILTER`]。
/// 已经安装过全局 subscriber 时静默返回。
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        init_logging();
        tracing::info!("logging initialized twice without panicking");
    }
}
