//! 会话层错误类型定义

/// 接入器错误（致命，连接级错误不经此类型）
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// 端口绑定 / accept 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
