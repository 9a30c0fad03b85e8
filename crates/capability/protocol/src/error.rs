//! 协议解码错误类型定义

/// 协议解码/编码错误
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// 帧长度与声明不符
    #[error("truncated frame: {0}")]
    Truncated(String),

    /// 校验和不匹配（主校验与回退校验均失败）
    #[error("checksum mismatch: expected {expected:04x}, got {actual:04x}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    /// 数据解析错误
    #[error("data parse error: {0}")]
    DataParse(String),

    /// 编码错误（如命令超长）
    #[error("encode error: {0}")]
    Encode(String),
}
