//! Errno taxonomy.
//!
//! Every failure that leaves a backend is an `FsError` carrying one of the
//! codes below. Numeric values follow node's errno table, with mntfs-specific
//! codes from 1000 up.

use std::fmt;
use std::io;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

macro_rules! error_codes {
    ($( $variant:ident => ($errno:expr, $name:literal, $message:literal), )*) => {
        /// A symbolic, POSIX-inspired error identifier.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum ErrorCode {
            $( #[serde(rename = $name)] $variant, )*
        }

        impl ErrorCode {
            /// Every code, in errno order.
            pub const ALL: &'static [ErrorCode] = &[ $( ErrorCode::$variant, )* ];

            /// Numeric errno.
            pub fn errno(self) -> i32 {
                match self { $( ErrorCode::$variant => $errno, )* }
            }

            /// Symbolic name, e.g. `"ENOENT"`.
            pub fn name(self) -> &'static str {
                match self { $( ErrorCode::$variant => $name, )* }
            }

            /// Message used when the caller supplies none.
            pub fn default_message(self) -> &'static str {
                match self { $( ErrorCode::$variant => $message, )* }
            }
        }
    };
}

error_codes! {
    Unknown => (-1, "UNKNOWN", "unknown error"),
    Ok => (0, "OK", "success"),
    Eof => (1, "EOF", "end of file"),
    AccessDenied => (3, "EACCES", "permission denied"),
    Again => (4, "EAGAIN", "resource temporarily unavailable"),
    BadDescriptor => (9, "EBADF", "bad file descriptor"),
    Busy => (10, "EBUSY", "resource busy or locked"),
    InvalidArgument => (18, "EINVAL", "invalid argument"),
    NotADirectory => (27, "ENOTDIR", "not a directory"),
    IsADirectory => (28, "EISDIR", "illegal operation on a directory"),
    NotFound => (34, "ENOENT", "no such file or directory"),
    NotImplemented => (35, "ENOSYS", "function not implemented"),
    InvalidCharset => (41, "ECHARSET", "invalid Unicode character"),
    AlreadyExists => (47, "EEXIST", "file already exists"),
    NameTooLong => (49, "ENAMETOOLONG", "name too long"),
    NotPermitted => (50, "EPERM", "operation not permitted"),
    SymlinkLoop => (51, "ELOOP", "too many symbolic links encountered"),
    CrossDevice => (52, "EXDEV", "cross-device link not permitted"),
    NotEmpty => (53, "ENOTEMPTY", "directory not empty"),
    NoSpace => (54, "ENOSPC", "no space left on device"),
    Io => (55, "EIO", "i/o error"),
    ReadOnly => (56, "EROFS", "read-only file system"),
    Canceled => (59, "ECANCELED", "operation canceled"),
    NotMounted => (1000, "ENOTMOUNTED", "not mounted"),
    FilesystemState => (1001, "EFILESYSTEMERROR", "missing filesystem state"),
    NoAttribute => (1002, "ENOATTR", "attribute does not exist"),
}

impl ErrorCode {
    /// Look a code up by its numeric errno.
    pub fn from_errno(errno: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.errno() == errno)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ErrorCode {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.name() == s)
            .ok_or_else(|| FsError::invalid(format!("unknown error code: {s}")))
    }
}

/// A typed filesystem error: `{code, errno, message, path?}`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{}: {}{}", .code.name(), .message, path_suffix(.path.as_deref()))]
pub struct FsError {
    code: ErrorCode,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<String>,
}

fn path_suffix(path: Option<&str>) -> String {
    path.map(|p| format!(", '{p}'")).unwrap_or_default()
}

pub type FsResult<T> = Result<T, FsError>;

impl FsError {
    /// An error with the code's default message.
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
            path: None,
        }
    }

    /// An error with a caller-supplied message.
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            code,
            message: if message.is_empty() {
                code.default_message().to_string()
            } else {
                message
            },
            path: None,
        }
    }

    /// Attach the path the failure concerns.
    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::AlreadyExists, message)
    }

    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::AccessDenied, message)
    }

    pub fn not_permitted(message: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::NotPermitted, message)
    }

    pub fn not_a_directory(message: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::NotADirectory, message)
    }

    pub fn is_a_directory(message: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::IsADirectory, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::InvalidArgument, message)
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::NotImplemented, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::Io, message)
    }

    pub fn canceled(message: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::Canceled, message)
    }

    pub fn not_empty(message: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::NotEmpty, message)
    }

    pub fn cross_device(message: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::CrossDevice, message)
    }

    /// Wrap any mount failure as `ENOTMOUNTED`, keeping the cause text.
    pub fn not_mounted(cause: impl fmt::Display) -> Self {
        Self::with_message(ErrorCode::NotMounted, cause.to_string())
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn errno(&self) -> i32 {
        self.code.errno()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// True if this error carries `code`.
    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code
    }
}

impl From<ErrorCode> for FsError {
    fn from(code: ErrorCode) -> Self {
        Self::new(code)
    }
}

impl From<io::Error> for FsError {
    fn from(err: io::Error) -> Self {
        let code = match err.kind() {
            io::ErrorKind::NotFound => ErrorCode::NotFound,
            io::ErrorKind::PermissionDenied => ErrorCode::AccessDenied,
            io::ErrorKind::AlreadyExists => ErrorCode::AlreadyExists,
            io::ErrorKind::NotADirectory => ErrorCode::NotADirectory,
            io::ErrorKind::IsADirectory => ErrorCode::IsADirectory,
            io::ErrorKind::DirectoryNotEmpty => ErrorCode::NotEmpty,
            io::ErrorKind::InvalidInput => ErrorCode::InvalidArgument,
            io::ErrorKind::InvalidData => ErrorCode::InvalidCharset,
            io::ErrorKind::Unsupported => ErrorCode::NotImplemented,
            io::ErrorKind::ReadOnlyFilesystem => ErrorCode::ReadOnly,
            io::ErrorKind::CrossesDevices => ErrorCode::CrossDevice,
            io::ErrorKind::StorageFull => ErrorCode::NoSpace,
            io::ErrorKind::ResourceBusy => ErrorCode::Busy,
            io::ErrorKind::UnexpectedEof => ErrorCode::Eof,
            io::ErrorKind::Interrupted => ErrorCode::Canceled,
            _ => ErrorCode::Io,
        };
        Self::with_message(code, err.to_string())
    }
}
