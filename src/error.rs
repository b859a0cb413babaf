//! 错误类型定义
//!
//! 提供块缓存与请求调度操作的错误类型。
//!
//! 可恢复的错误（设备 I/O 失败、配置错误）通过 [`Result`] 返回；
//! 表示内存结构损坏的不变量违例通过 [`fatal!`](crate::fatal) 直接停机。

use core::fmt;

/// 块缓存操作错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: &'static str,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// I/O 错误（设备报告传输失败）
    Io,
    /// 无效参数
    InvalidInput,
    /// 不存在
    NotFound,
    /// 已存在
    AlreadyExists,
    /// 不支持的操作
    Unsupported,
}

impl Error {
    /// 创建新错误
    pub const fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self { kind, message }
    }

    /// 获取错误类型
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 获取错误消息
    pub const fn message(&self) -> &'static str {
        self.message
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result 类型别名
pub type Result<T> = core::result::Result<T, Error>;

/// 不可恢复的不变量违例：记录诊断信息后停机
///
/// 重复释放、句柄失效、空闲环损坏等情况说明内存结构已经不可信，
/// 不能作为错误返回给调用者。
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {{
        $crate::log::error!("[PANIC] {}", ::core::format_args!($($arg)*));
        ::core::panic!($($arg)*)
    }};
}
