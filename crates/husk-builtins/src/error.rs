//! Errors raised inside builtins

use std::io;

/// A builtin failure, rendered on the command's stderr
#[derive(thiserror::Error, Debug)]
pub enum BuiltinError {
    #[error("{tool}: {message}")]
    Usage { tool: &'static str, message: String },

    #[error("{tool}: {path}: {reason}")]
    Path {
        tool: &'static str,
        path: String,
        reason: String,
    },

    #[error("write error: {0}")]
    Write(#[from] io::Error),
}

impl BuiltinError {
    pub fn usage(tool: &'static str, message: impl Into<String>) -> Self {
        Self::Usage {
            tool,
            message: message.into(),
        }
    }

    pub fn path(tool: &'static str, path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Path {
            tool,
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Path error whose reason comes from an OS error
    pub fn io(tool: &'static str, path: impl Into<String>, err: &io::Error) -> Self {
        Self::path(tool, path, io_reason(err))
    }
}

/// Coreutils-style text for an OS error, without the `(os error N)` suffix
#[must_use]
pub fn io_reason(err: &io::Error) -> String {
    let reason = match err.kind() {
        io::ErrorKind::NotFound => "No such file or directory",
        io::ErrorKind::PermissionDenied => "Permission denied",
        io::ErrorKind::AlreadyExists => "File exists",
        io::ErrorKind::DirectoryNotEmpty => "Directory not empty",
        io::ErrorKind::IsADirectory => "Is a directory",
        io::ErrorKind::NotADirectory => "Not a directory",
        _ => {
            let text = err.to_string();
            return match text.find(" (os error") {
                Some(end) => text[..end].to_string(),
                None => text,
            };
        }
    };
    reason.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_formats() {
        assert_eq!(
            BuiltinError::usage("seq", "zero increment").to_string(),
            "seq: zero increment"
        );
        assert_eq!(
            BuiltinError::path("rm", "dir", "Directory not empty").to_string(),
            "rm: dir: Directory not empty"
        );
    }

    #[test]
    fn test_io_reason() {
        let err = io::Error::from(io::ErrorKind::NotFound);
        assert_eq!(io_reason(&err), "No such file or directory");
        let err = io::Error::other("custom failure");
        assert_eq!(io_reason(&err), "custom failure");
    }
}
