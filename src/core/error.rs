//! 内核错误类型
//!
//! 连接监管与主循环的所有失败都归入 KernelError；RecoveryEngine 据此决定退避还是立即进入下一轮。

use thiserror::Error;

/// 后端连接与流式交换中可能出现的错误
#[derive(Error, Debug)]
pub enum KernelError {
    /// 后端参数不合法（连接时同步抛出）
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// 生命周期调用顺序不合法（重复连接、未连接即交换等）
    #[error("Illegal backend state: {0}")]
    IllegalState(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    /// 响应载荷无法解析
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl KernelError {
    /// 稳定的短标签，用作日志字段
    pub fn kind(&self) -> &'static str {
        match self {
            KernelError::InvalidConfiguration(_) => "invalid_configuration",
            KernelError::IllegalState(_) => "illegal_state",
            KernelError::Network(_) => "network",
            KernelError::Timeout(_) => "timeout",
            KernelError::Serialization(_) => "serialization",
            KernelError::InvalidArgument(_) => "invalid_argument",
        }
    }

    /// 网络 / 超时：下一轮前需要退避
    pub fn is_transient_io(&self) -> bool {
        matches!(self, KernelError::Network(_) | KernelError::Timeout(_))
    }
}

impl From<serde_json::Error> for KernelError {
    fn from(err: serde_json::Error) -> Self {
        KernelError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels() {
        assert_eq!(KernelError::InvalidConfiguration("x".into()).kind(), "invalid_configuration");
        assert_eq!(KernelError::IllegalState("x".into()).kind(), "illegal_state");
        assert_eq!(KernelError::Timeout(60).kind(), "timeout");
    }

    #[test]
    fn test_transient_io_classification() {
        assert!(KernelError::Network("reset".into()).is_transient_io());
        assert!(KernelError::Timeout(60).is_transient_io());
        assert!(!KernelError::Serialization("bad".into()).is_transient_io());
        assert!(!KernelError::InvalidArgument("bad".into()).is_transient_io());
    }

    #[test]
    fn test_from_serde_json_error() {
        let err: KernelError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(matches!(err, KernelError::Serialization(_)));
        assert!(err.to_string().starts_with("Serialization error"));
    }
}
