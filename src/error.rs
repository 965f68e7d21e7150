//! Error types for deployments

use thiserror::Error;

/// Deployment result type
pub type Result<T> = std::result::Result<T, DeployError>;

/// Machine-readable failure taxonomy.
///
/// Each kind maps to one step of the deployment pipeline so callers can
/// branch on *what* failed without parsing the human-readable reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Could not create the remote workspace (`mktemp -d`)
    MkTmpDir,
    /// Local-to-remote file transfer failed
    PutFile,
    /// Remote extraction (unzip / untar) failed
    Unzip,
    /// No running container matched the configured name
    GetCid,
    /// Removal of a local or remote path failed
    RmFile,
    /// Copy into the container failed
    CpDir,
    /// Move to the static path failed
    MvDir,
    /// Invalid or missing configuration
    IllegalArgument,
    /// Local tar archive creation failed
    TarDir,
    /// Could not open or authenticate the SSH session
    Connection,
}

impl ErrorKind {
    /// Stable numeric code for the kind.
    pub fn code(&self) -> u16 {
        match self {
            ErrorKind::MkTmpDir => 1001,
            ErrorKind::PutFile => 1002,
            ErrorKind::Unzip => 1003,
            ErrorKind::GetCid => 1004,
            ErrorKind::RmFile => 1005,
            ErrorKind::CpDir => 1006,
            ErrorKind::MvDir => 1007,
            ErrorKind::IllegalArgument => 1008,
            ErrorKind::TarDir => 1009,
            ErrorKind::Connection => 1010,
        }
    }

    /// Symbolic identifier for the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MkTmpDir => "ERR_MK_TMP_DIR",
            ErrorKind::PutFile => "ERR_PUT_FILE",
            ErrorKind::Unzip => "ERR_UNZIP",
            ErrorKind::GetCid => "ERR_GET_CID",
            ErrorKind::RmFile => "ERR_RM_FILE",
            ErrorKind::CpDir => "ERR_CP_DIR",
            ErrorKind::MvDir => "ERR_MV_DIR",
            ErrorKind::IllegalArgument => "ERR_ILLEGAL_ARGUMENT",
            ErrorKind::TarDir => "ERR_TAR_DIR",
            ErrorKind::Connection => "ERR_CONNECTION",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A failed deployment step.
///
/// Created at the point of failure and *returned* to the caller; errors never
/// propagate as panics across the batch boundary. `reason` names the step and
/// the path involved; `cause` carries the underlying failure text (usually the
/// remote command's stderr, possibly empty).
#[derive(Debug, Clone, Error)]
#[error("{kind} {reason}: {cause}")]
pub struct DeployError {
    /// Which step failed
    pub kind: ErrorKind,
    /// Human-readable description naming the step and path
    pub reason: String,
    /// Underlying failure text
    pub cause: String,
}

impl DeployError {
    /// Create a new deployment error.
    pub fn new(kind: ErrorKind, reason: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
            cause: cause.into(),
        }
    }
}

/// Transport-level failure, before a step-specific [`ErrorKind`] is assigned.
///
/// The session and channel layers report these; the orchestrator wraps them
/// into a [`DeployError`] with the kind of whichever step was running.
#[derive(Debug, Error)]
pub enum TransportError {
    /// SSH protocol or connection error
    #[error("ssh: {0}")]
    Ssh(#[from] russh::Error),

    /// SFTP subsystem error
    #[error("sftp: {0}")]
    Sftp(#[from] russh_sftp::client::error::Error),

    /// Local IO error
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_codes_are_stable() {
        assert_eq!(ErrorKind::MkTmpDir.code(), 1001);
        assert_eq!(ErrorKind::TarDir.code(), 1009);
        assert_eq!(ErrorKind::IllegalArgument.code(), 1008);
    }

    #[test]
    fn test_deploy_error_display() {
        let err = DeployError::new(
            ErrorKind::Unzip,
            "cannot extract /tmp/x/build.zip into /tmp/x",
            "unzip: command not found",
        );
        let text = err.to_string();
        assert!(text.contains("ERR_UNZIP"));
        assert!(text.contains("/tmp/x/build.zip"));
        assert!(text.contains("command not found"));
    }

    #[test]
    fn test_deploy_error_empty_cause() {
        let err = DeployError::new(ErrorKind::RmFile, "cannot remove /srv/static", "");
        assert_eq!(err.to_string(), "ERR_RM_FILE cannot remove /srv/static: ");
    }
}
