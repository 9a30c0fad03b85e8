//! 帧重组器
//!
//! 面向追加写入的字节流，按协议组帧规则一次产出一个完整帧。
//! 只识别帧边界，不理解帧语义；解码由各协议 codec 承担。
//!
//! 组帧规则：
//!
//! | 协议 | 起始 | 长度字段 | 结束 |
//! |---|---|---|---|
//! | GT06 短帧 | `0x78 0x78` | 偏移 2 处 1 字节 | `0x0D 0x0A` |
//! | GT06 长帧 | `0x79 0x79` | 偏移 2 处 2 字节 BE | `0x0D 0x0A` |
//! | Teltonika IMEI | 前 2 字节 BE == 15 | 隐含 15 | 无 |
//! | Teltonika AVL | 前 4 字节全零 | 偏移 4 处 4 字节 BE | 尾随 4 字节 CRC |

/// Teltonika AVL 数据段长度上限（防御畸形设备把缓冲撑爆）。
pub const MAX_AVL_DATA_LEN: usize = 64 * 1024;

/// 组帧方式（按监听端口固定映射）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Gt06,
    Teltonika,
}

/// 取帧结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameStatus {
    /// 一个完整帧，其字节已从缓冲消费
    Frame(Vec<u8>),
    /// 数据不足，保持缓冲等待后续字节
    NeedMore,
    /// 起始字节不匹配任何组帧规则；会话层必须关闭连接
    Invalid,
}

/// 单连接接收缓冲。
///
/// 由驱动连接的任务独占持有，不跨任务共享。
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// 追加收到的字节。
    pub fn append(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// 当前缓冲长度。
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// 尝试取出下一个完整帧；不阻塞。
    pub fn try_take_frame(&mut self, framing: Framing) -> FrameStatus {
        match framing {
            Framing::Gt06 => self.take_gt06(),
            Framing::Teltonika => self.take_teltonika(),
        }
    }

    fn take(&mut self, total: usize) -> FrameStatus {
        let frame = self.buf.drain(..total).collect();
        FrameStatus::Frame(frame)
    }

    fn take_gt06(&mut self) -> FrameStatus {
        if self.buf.is_empty() {
            return FrameStatus::NeedMore;
        }
        if self.buf[0] != 0x78 && self.buf[0] != 0x79 {
            return FrameStatus::Invalid;
        }
        if self.buf.len() < 2 {
            return FrameStatus::NeedMore;
        }
        match (self.buf[0], self.buf[1]) {
            (0x78, 0x78) => {
                if self.buf.len() < 3 {
                    return FrameStatus::NeedMore;
                }
                let len = self.buf[2] as usize;
                if len == 0 {
                    return FrameStatus::Invalid;
                }
                // start(2) + len(1) + len + 终止符(2)
                let total = 5 + len;
                if self.buf.len() < total {
                    return FrameStatus::NeedMore;
                }
                if self.buf[total - 2] != 0x0d || self.buf[total - 1] != 0x0a {
                    return FrameStatus::Invalid;
                }
                self.take(total)
            }
            (0x79, 0x79) => {
                if self.buf.len() < 4 {
                    return FrameStatus::NeedMore;
                }
                let len = u16::from_be_bytes([self.buf[2], self.buf[3]]) as usize;
                if len == 0 {
                    return FrameStatus::Invalid;
                }
                let total = 6 + len;
                if self.buf.len() < total {
                    return FrameStatus::NeedMore;
                }
                if self.buf[total - 2] != 0x0d || self.buf[total - 1] != 0x0a {
                    return FrameStatus::Invalid;
                }
                self.take(total)
            }
            _ => FrameStatus::Invalid,
        }
    }

    fn take_teltonika(&mut self) -> FrameStatus {
        if self.buf.len() < 2 {
            return FrameStatus::NeedMore;
        }
        let prefix = u16::from_be_bytes([self.buf[0], self.buf[1]]);
        if prefix == 15 {
            // IMEI 握手帧：2 字节长度 + 15 个 ASCII 数字
            let total = 2 + 15;
            if self.buf.len() < total {
                return FrameStatus::NeedMore;
            }
            return self.take(total);
        }
        if prefix != 0 {
            return FrameStatus::Invalid;
        }
        if self.buf.len() < 4 {
            return FrameStatus::NeedMore;
        }
        if self.buf[2] != 0 || self.buf[3] != 0 {
            return FrameStatus::Invalid;
        }
        if self.buf.len() < 8 {
            return FrameStatus::NeedMore;
        }
        let data_len =
            u32::from_be_bytes([self.buf[4], self.buf[5], self.buf[6], self.buf[7]]) as usize;
        if data_len == 0 || data_len > MAX_AVL_DATA_LEN {
            return FrameStatus::Invalid;
        }
        // preamble(4) + dataLen(4) + data + CRC(4)
        let total = 8 + data_len + 4;
        if self.buf.len() < total {
            return FrameStatus::NeedMore;
        }
        self.take(total)
    }
}
