use core::fmt;
use thiserror::Error;

/// POSIX-style error codes surfaced by file system operations.
///
/// Callers are expected to match on the code; messages exist for humans.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    EACCES,
    EIO,
    ENOENT,
    EEXIST,
    ELOOP,
    ENOTDIR,
    EISDIR,
    EBADF,
    EINVAL,
    ENOTEMPTY,
    EPERM,
    EROFS,
}

impl ErrorCode {
    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::EACCES => "access denied",
            ErrorCode::EIO => "an I/O error occurred",
            ErrorCode::ENOENT => "no such file or directory",
            ErrorCode::EEXIST => "file already exists",
            ErrorCode::ELOOP => "too many symbolic links encountered",
            ErrorCode::ENOTDIR => "no such directory",
            ErrorCode::EISDIR => "path is a directory",
            ErrorCode::EBADF => "invalid file descriptor",
            ErrorCode::EINVAL => "invalid value",
            ErrorCode::ENOTEMPTY => "directory not empty",
            ErrorCode::EPERM => "operation not permitted",
            ErrorCode::EROFS => "file system is read-only",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Runtime failure of a file system operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{code}: {}", .code.message())]
pub struct IoError {
    pub code: ErrorCode,
}

impl IoError {
    pub fn new(code: ErrorCode) -> Self {
        IoError { code }
    }
}

impl From<ErrorCode> for IoError {
    fn from(code: ErrorCode) -> Self {
        IoError { code }
    }
}

impl From<std::io::Error> for IoError {
    fn from(error: std::io::Error) -> Self {
        use std::io::ErrorKind;
        let code = match error.kind() {
            ErrorKind::NotFound => ErrorCode::ENOENT,
            ErrorKind::PermissionDenied => ErrorCode::EACCES,
            ErrorKind::AlreadyExists => ErrorCode::EEXIST,
            ErrorKind::InvalidInput | ErrorKind::InvalidData => ErrorCode::EINVAL,
            _ => ErrorCode::EIO,
        };
        IoError { code }
    }
}

pub type Result<T> = core::result::Result<T, IoError>;
