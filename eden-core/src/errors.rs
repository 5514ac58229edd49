//! The error taxonomy of the core, and its mapping onto POSIX errno values
//! for embedders that sit behind a real kernel transport.
use crate::hash::Hash;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("too many levels of symbolic links")]
    SymlinkLoop,

    #[error("invalid cross-device link: {0}")]
    CrossDeviceLink(String),

    #[error("operation not permitted: {0}")]
    PermissionDenied(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("commit {0} not found")]
    Domain(Hash),

    #[error("importer failure: {0}")]
    ImporterFailure(String),
}

impl Error {
    /// The POSIX errno this error kind maps to.
    pub fn errno(&self) -> libc::c_int {
        match self {
            Error::NotFound(_) => libc::ENOENT,
            Error::AlreadyExists(_) => libc::EEXIST,
            Error::NotADirectory(_) => libc::ENOTDIR,
            Error::IsADirectory(_) => libc::EISDIR,
            Error::SymlinkLoop => libc::ELOOP,
            Error::CrossDeviceLink(_) => libc::EXDEV,
            Error::PermissionDenied(_) => libc::EPERM,
            Error::InvalidArgument(_) => libc::EINVAL,
            // Domain and ImporterFailure have no natural errno; callers
            // embedding this in a kernel transport should surface them as
            // EIO, but init failures usually never reach that layer.
            Error::Domain(_) => libc::EIO,
            Error::ImporterFailure(_) => libc::EIO,
        }
    }
}

impl From<Error> for std::io::Error {
    fn from(value: Error) -> Self {
        std::io::Error::from_raw_os_error(value.errno())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
