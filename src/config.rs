//! Deployment target configuration and the validation gate.
//!
//! A config file holds either a single target object or an array of them.
//! Field names are camelCase on the wire; the two 1.x field names
//! (`zipInnerName`, `staticDir`) are still accepted and folded into their
//! current equivalents before validation runs. Unknown fields are rejected
//! at parse time.

use crate::error::{DeployError, ErrorKind, Result};
use serde::Deserialize;

/// One remote host plus the deployment parameters for it.
///
/// Constructed from external configuration, validated once, then consumed
/// read-only for the duration of one deployment (the only mutation is
/// [`normalize`](Self::normalize), which folds legacy field names).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct DeployTarget {
    /// Remote host name or address
    pub host: String,

    /// SSH port; must be present, the validation gate rejects a target
    /// without one
    #[serde(default)]
    pub port: Option<u16>,

    /// SSH user
    pub username: String,

    /// SSH password; also answers the sudo prompt on privileged retries
    #[serde(default)]
    pub password: Option<String>,

    /// Private key material (OpenSSH PEM text); preferred over password when set
    #[serde(default)]
    pub private_key: Option<String>,

    /// Container name; when set, content is placed inside this container
    #[serde(default)]
    pub cname: Option<String>,

    /// Local directory to archive and upload (for hosts without unzip)
    #[serde(default)]
    pub dist: Option<String>,

    /// Prebuilt archive path to upload
    #[serde(default)]
    pub zip_file: Option<String>,

    /// Directory name inside the archive that holds the content
    #[serde(default)]
    pub archive_dir_name: Option<String>,

    /// 1.x name for `archiveDirName`
    #[serde(default)]
    pub zip_inner_name: Option<String>,

    /// Remote directory that receives the content
    #[serde(default)]
    pub remote_static: Option<String>,

    /// 1.x name for `remoteStatic`
    #[serde(default)]
    pub static_dir: Option<String>,

    /// Verbose step-by-step tracing for this run
    #[serde(default)]
    pub debug: bool,
}

impl DeployTarget {
    /// Fold 1.x field names into their current equivalents.
    ///
    /// The current name wins when both are present. Runs before any
    /// validation logic looks at the fields.
    pub fn normalize(&mut self) {
        if self.archive_dir_name.is_none() {
            self.archive_dir_name = self.zip_inner_name.take();
        }
        if self.remote_static.is_none() {
            self.remote_static = self.static_dir.take();
        }
    }

    /// Validate the target before any remote action is attempted.
    ///
    /// All-or-nothing gate: a failure here means the orchestrator never
    /// opens a connection. Call [`normalize`](Self::normalize) first.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(illegal("host must not be empty"));
        }
        if self.username.trim().is_empty() {
            return Err(illegal("username must not be empty"));
        }
        if self.port.is_none() {
            return Err(illegal("port must be set"));
        }

        let remote_static = self.remote_static.as_deref().unwrap_or("").trim();
        if remote_static.is_empty()
            || remote_static.contains('*')
            || remote_static.chars().all(|c| c == '/')
        {
            return Err(illegal("invalid remoteStatic (or staticDir)"));
        }

        Ok(())
    }

    /// The SSH port, falling back to 22 for programmatically built targets
    /// that bypassed the gate.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(22)
    }

    /// The validated remote static directory.
    ///
    /// Only meaningful after [`validate`](Self::validate) has passed.
    pub fn remote_static(&self) -> &str {
        self.remote_static.as_deref().unwrap_or("").trim()
    }
}

fn illegal(reason: &str) -> DeployError {
    DeployError::new(ErrorKind::IllegalArgument, reason, reason)
}

/// A config file: one target or an ordered list of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum BatchConfig {
    /// Single target object
    One(Box<DeployTarget>),
    /// Ordered list of targets
    Many(Vec<DeployTarget>),
}

impl BatchConfig {
    /// Flatten into an ordered target list (a single target becomes a
    /// one-element list).
    pub fn into_targets(self) -> Vec<DeployTarget> {
        match self {
            BatchConfig::One(target) => vec![*target],
            BatchConfig::Many(targets) => targets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> DeployTarget {
        serde_json::from_str(json).unwrap()
    }

    fn valid_target() -> DeployTarget {
        parse(
            r#"{
                "host": "h",
                "port": 22,
                "username": "u",
                "password": "p",
                "dist": "/local/app",
                "remoteStatic": "/srv/static"
            }"#,
        )
    }

    #[test]
    fn test_valid_target_passes_the_gate() {
        let target = valid_target();
        assert!(target.validate().is_ok());
        assert_eq!(target.port(), 22);
        assert!(!target.debug);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result: std::result::Result<DeployTarget, _> = serde_json::from_str(
            r#"{"host": "h", "username": "u", "remoteStatic": "/srv", "bogus": 1}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_required_fields_rejected() {
        let result: std::result::Result<DeployTarget, _> =
            serde_json::from_str(r#"{"remoteStatic": "/srv"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_port_rejected_before_any_connection() {
        // Parses fine, but the gate must stop it; the orchestrator never
        // gets to open a session with an implied port.
        let target = parse(
            r#"{
                "host": "h",
                "username": "u",
                "password": "p",
                "dist": "/local/app",
                "remoteStatic": "/srv/static"
            }"#,
        );
        let err = target.validate().unwrap_err();
        assert_eq!(err.kind, ErrorKind::IllegalArgument);
    }

    #[test]
    fn test_legacy_names_fold_into_current() {
        let mut target = parse(
            r#"{
                "host": "h",
                "port": 22,
                "username": "u",
                "zipFile": "build.zip",
                "zipInnerName": "build",
                "staticDir": "/srv/static"
            }"#,
        );
        target.normalize();
        assert_eq!(target.archive_dir_name.as_deref(), Some("build"));
        assert_eq!(target.remote_static.as_deref(), Some("/srv/static"));
        assert!(target.validate().is_ok());
    }

    #[test]
    fn test_current_name_wins_over_legacy() {
        let mut target = parse(
            r#"{
                "host": "h",
                "username": "u",
                "remoteStatic": "/srv/new",
                "staticDir": "/srv/old"
            }"#,
        );
        target.normalize();
        assert_eq!(target.remote_static.as_deref(), Some("/srv/new"));
    }

    #[test]
    fn test_remote_static_rejections() {
        for bad in ["", "   ", "/", "///", " / ", "/srv/*", "*"] {
            let mut target = valid_target();
            target.remote_static = Some(bad.to_string());
            let err = target.validate().unwrap_err();
            assert_eq!(err.kind, ErrorKind::IllegalArgument, "value: {bad:?}");
        }
    }

    #[test]
    fn test_missing_remote_static_rejected() {
        let mut target = valid_target();
        target.remote_static = None;
        target.normalize();
        assert_eq!(
            target.validate().unwrap_err().kind,
            ErrorKind::IllegalArgument
        );
    }

    #[test]
    fn test_blank_host_or_username_rejected() {
        let mut target = valid_target();
        target.host = " ".to_string();
        assert!(target.validate().is_err());

        let mut target = valid_target();
        target.username = String::new();
        assert!(target.validate().is_err());
    }

    #[test]
    fn test_batch_config_accepts_object_or_array() {
        let one: BatchConfig =
            serde_json::from_str(r#"{"host": "h", "username": "u", "remoteStatic": "/srv"}"#)
                .unwrap();
        assert_eq!(one.into_targets().len(), 1);

        let many: BatchConfig = serde_json::from_str(
            r#"[
                {"host": "a", "username": "u", "remoteStatic": "/srv"},
                {"host": "b", "username": "u", "remoteStatic": "/srv"}
            ]"#,
        )
        .unwrap();
        let targets = many.into_targets();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].host, "a");
        assert_eq!(targets[1].host, "b");
    }
}
