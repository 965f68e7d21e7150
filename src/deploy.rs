//! Deployment orchestration for a single target.
//!
//! Linear pipeline with two branch points and one cross-cutting retry:
//!
//! ```text
//! validate ── connect ── make workspace
//!     │
//!     ├── archive supplied:   upload zip ── remote unzip
//!     ├── directory supplied: local tar ── upload ── rm local tar ── remote untar
//!     │
//!     ├── container configured:  docker ps ── docker exec rm ── docker cp
//!     └── plain filesystem:      rm -fr static ── mv content static
//!                                 (each falls back once to sudo + pty on
//!                                  a permission-denied failure)
//!     │
//!     └── cleanup: rm -fr workspace (always), close session (always)
//! ```
//!
//! Every step depends on the side effect of the previous one, so the whole
//! pipeline is awaited strictly in sequence. A failure is captured where it
//! happens and returned as a [`DeployError`]; nothing panics across this
//! boundary. The workspace created on the remote host is removed on every
//! exit path once it exists, and a cleanup failure never overwrites an
//! earlier, more specific one.

use crate::channel::CommandOutcome;
use crate::config::DeployTarget;
use crate::error::{DeployError, ErrorKind, Result};
use crate::session::RemoteSession;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{Instrument, debug, info, info_span, warn};

/// Deploy one target end to end.
///
/// Validation runs first; on a validation failure no connection is ever
/// opened. The session is closed exactly once on every exit path.
pub async fn deploy(target: &DeployTarget) -> Result<()> {
    let mut target = target.clone();
    target.normalize();
    target.validate()?;

    let span = info_span!("deploy", host = %target.host);
    async {
        let mut session = RemoteSession::connect(&target).await?;
        let result = run_pipeline(&mut session, &target).await;
        session.close().await;
        result
    }
    .instrument(span)
    .await
}

/// Everything between connect and close: workspace, staging, placement,
/// guaranteed cleanup.
async fn run_pipeline(session: &mut RemoteSession, target: &DeployTarget) -> Result<()> {
    let workspace = make_workspace(session, target).await?;

    // From here on the workspace exists and must be removed no matter how
    // the remaining steps end.
    let placed = stage_and_place(session, target, &workspace).await;
    let cleaned = cleanup_workspace(session, target, &workspace).await;

    match (placed, cleaned) {
        (Err(step_error), _) => Err(step_error),
        (Ok(()), Err(cleanup_error)) => Err(cleanup_error),
        (Ok(()), Ok(())) => Ok(()),
    }
}

/// Create the ephemeral remote workspace (`mktemp -d`).
async fn make_workspace(session: &mut RemoteSession, target: &DeployTarget) -> Result<String> {
    let output = exec_checked(
        session,
        "mktemp -d",
        ErrorKind::MkTmpDir,
        "cannot create remote workspace",
    )
    .await?;

    let workspace = trim_line_endings(&output);
    if workspace.is_empty() {
        return Err(DeployError::new(
            ErrorKind::MkTmpDir,
            "cannot create remote workspace",
            "mktemp -d produced no path",
        ));
    }

    step(target, format_args!("created remote workspace {workspace}"));
    Ok(workspace.to_string())
}

/// Branch on the artifact source, then on the placement mode.
async fn stage_and_place(
    session: &mut RemoteSession,
    target: &DeployTarget,
    workspace: &str,
) -> Result<()> {
    let content_root = if let Some(zip_file) = target.zip_file.as_deref() {
        stage_archive(session, target, zip_file, workspace).await?
    } else if let Some(dist) = target.dist.as_deref() {
        stage_directory(session, target, dist, workspace).await?
    } else {
        return Err(DeployError::new(
            ErrorKind::IllegalArgument,
            "either zipFile or dist must be configured",
            "no artifact source",
        ));
    };

    match target.cname.as_deref() {
        Some(cname) => place_in_container(session, target, cname, &content_root).await,
        None => place_on_filesystem(session, target, &content_root).await,
    }
}

/// Upload a prebuilt archive and extract it into the workspace.
///
/// Returns the content root: `workspace/<archiveDirName>`, or the workspace
/// itself when no inner directory name is configured.
async fn stage_archive(
    session: &mut RemoteSession,
    target: &DeployTarget,
    zip_file: &str,
    workspace: &str,
) -> Result<String> {
    let zip_path = absolutize(zip_file, ErrorKind::PutFile)?;
    let file_name = base_name(&zip_path, ErrorKind::PutFile)?;
    let remote_zip = remote_join(workspace, &file_name);

    session.upload(&zip_path, &remote_zip).await.map_err(|e| {
        DeployError::new(
            ErrorKind::PutFile,
            format!("cannot upload {} to {remote_zip}", zip_path.display()),
            e.to_string(),
        )
    })?;
    step(
        target,
        format_args!("uploaded {} to {remote_zip}", zip_path.display()),
    );

    exec_checked(
        session,
        &format!("unzip -q {remote_zip} -d {workspace}"),
        ErrorKind::Unzip,
        &format!("cannot extract {remote_zip} into {workspace}"),
    )
    .await?;

    let content_root = match target.archive_dir_name.as_deref() {
        Some(inner) if !inner.is_empty() => remote_join(workspace, inner),
        _ => workspace.to_string(),
    };
    step(
        target,
        format_args!("extracted {remote_zip} to {content_root}"),
    );
    Ok(content_root)
}

/// Archive a local directory, upload it and extract it into the workspace.
///
/// The local tarball is removed whether or not the upload succeeded; a
/// removal failure is reported but does not fail the run. A tar failure
/// short-circuits (there is nothing real to upload).
async fn stage_directory(
    session: &mut RemoteSession,
    target: &DeployTarget,
    dist: &str,
    workspace: &str,
) -> Result<String> {
    let dist_path = absolutize(dist, ErrorKind::TarDir)?;
    let dir_name = base_name(&dist_path, ErrorKind::TarDir)?;
    let tar_name = format!("{dir_name}.tar.gz");
    let local_tar = dist_path
        .parent()
        .map(|p| p.join(&tar_name))
        .unwrap_or_else(|| PathBuf::from(&tar_name));
    let tar_parent = dist_path.parent().unwrap_or_else(|| Path::new("/"));

    let output = Command::new("tar")
        .arg("-zcf")
        .arg(&local_tar)
        .arg("-C")
        .arg(tar_parent)
        .arg(&dir_name)
        .output()
        .await
        .map_err(|e| {
            DeployError::new(
                ErrorKind::TarDir,
                format!("cannot archive {}", dist_path.display()),
                e.to_string(),
            )
        })?;
    if !output.status.success() {
        return Err(DeployError::new(
            ErrorKind::TarDir,
            format!("cannot archive {}", dist_path.display()),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ));
    }
    step(target, format_args!("archived {}", dist_path.display()));

    let remote_tar = remote_join(workspace, &tar_name);
    let uploaded = session.upload(&local_tar, &remote_tar).await;

    // The tarball is transient either way.
    if let Err(e) = tokio::fs::remove_file(&local_tar).await {
        warn!(
            "{} cannot remove local archive {}: {e}",
            ErrorKind::RmFile,
            local_tar.display()
        );
    }

    uploaded.map_err(|e| {
        DeployError::new(
            ErrorKind::PutFile,
            format!("cannot upload {} to {remote_tar}", local_tar.display()),
            e.to_string(),
        )
    })?;
    step(
        target,
        format_args!("uploaded {} to {remote_tar}", local_tar.display()),
    );

    exec_checked(
        session,
        &format!("tar -zxf {remote_tar} -C {workspace}"),
        ErrorKind::Unzip,
        &format!("cannot extract {remote_tar} into {workspace}"),
    )
    .await?;

    let content_root = remote_join(workspace, &dir_name);
    step(
        target,
        format_args!("extracted {remote_tar} to {content_root}"),
    );
    Ok(content_root)
}

/// Place the content root inside a running container.
async fn place_in_container(
    session: &mut RemoteSession,
    target: &DeployTarget,
    cname: &str,
    content_root: &str,
) -> Result<()> {
    let remote_static = target.remote_static();

    let listing = exec_checked(
        session,
        &format!("docker ps --filter name={cname}"),
        ErrorKind::GetCid,
        &format!("docker ps --filter name={cname} failed"),
    )
    .await?;
    let cid = parse_container_id(&listing).ok_or_else(|| {
        DeployError::new(
            ErrorKind::GetCid,
            format!("no running container matches name={cname}"),
            listing.trim().to_string(),
        )
    })?;
    step(target, format_args!("resolved container id {cid}"));

    exec_checked(
        session,
        &format!("docker exec {cid} rm -fr {remote_static}"),
        ErrorKind::RmFile,
        &format!("cannot remove {remote_static} inside container {cid}"),
    )
    .await?;
    step(
        target,
        format_args!("removed {remote_static} inside container {cid}"),
    );

    exec_checked(
        session,
        &format!("docker cp {content_root} {cid}:{remote_static}"),
        ErrorKind::CpDir,
        &format!("cannot copy {content_root} to {cid}:{remote_static}"),
    )
    .await?;
    step(
        target,
        format_args!("copied {content_root} to {cid}:{remote_static}"),
    );
    Ok(())
}

/// Place the content root directly on the host filesystem, escalating each
/// filesystem command at most once on a permission-denied failure.
async fn place_on_filesystem(
    session: &mut RemoteSession,
    target: &DeployTarget,
    content_root: &str,
) -> Result<()> {
    let remote_static = target.remote_static();

    exec_with_privileged_retry(
        session,
        target,
        &format!("rm -fr {remote_static}"),
        ErrorKind::RmFile,
        &format!("cannot remove static directory {remote_static}"),
    )
    .await?;
    step(target, format_args!("removed static directory {remote_static}"));

    exec_with_privileged_retry(
        session,
        target,
        &format!("mv {content_root} {remote_static}"),
        ErrorKind::MvDir,
        &format!("cannot move {content_root} to {remote_static}"),
    )
    .await?;
    step(
        target,
        format_args!("moved {content_root} to {remote_static}"),
    );
    Ok(())
}

/// Always-run release action for the remote workspace.
async fn cleanup_workspace(
    session: &mut RemoteSession,
    target: &DeployTarget,
    workspace: &str,
) -> Result<()> {
    let result = exec_checked(
        session,
        &format!("rm -fr {workspace}"),
        ErrorKind::RmFile,
        &format!("cannot remove remote workspace {workspace}"),
    )
    .await;
    match result {
        Ok(_) => {
            step(target, format_args!("removed remote workspace {workspace}"));
            Ok(())
        }
        Err(e) => {
            warn!("workspace cleanup failed: {e}");
            Err(e)
        }
    }
}

/// Run a remote command without a pty and turn a nonzero exit into a
/// [`DeployError`] of the given kind, carrying the accumulated stderr.
async fn exec_checked(
    session: &mut RemoteSession,
    command: &str,
    kind: ErrorKind,
    reason: &str,
) -> Result<String> {
    let channel = session
        .exec(command, false)
        .await
        .map_err(|e| DeployError::new(kind, reason, e.to_string()))?;
    let outcome = channel
        .consume(None)
        .await
        .map_err(|e| DeployError::new(kind, reason, e.to_string()))?;
    into_result(outcome, kind, reason)
}

/// Run a plain filesystem command; if it fails with a permission-denied
/// text, retry exactly once as `sudo` on a pty, answering the password
/// prompt. A second failure is final.
async fn exec_with_privileged_retry(
    session: &mut RemoteSession,
    target: &DeployTarget,
    command: &str,
    kind: ErrorKind,
    reason: &str,
) -> Result<()> {
    match exec_checked(session, command, kind, reason).await {
        Ok(_) => Ok(()),
        Err(e) if is_permission_denied(&e.cause) => {
            debug!("permission denied, retrying with sudo: {command}");
            let channel = session
                .exec(&format!("sudo {command}"), true)
                .await
                .map_err(|e| DeployError::new(kind, reason, e.to_string()))?;
            let outcome = channel
                .consume(target.password.as_deref())
                .await
                .map_err(|e| DeployError::new(kind, reason, e.to_string()))?;
            into_result(outcome, kind, reason).map(|_| ())
        }
        Err(e) => Err(e),
    }
}

fn into_result(outcome: CommandOutcome, kind: ErrorKind, reason: &str) -> Result<String> {
    if outcome.success {
        Ok(outcome.stdout)
    } else {
        Err(DeployError::new(kind, reason, outcome.stderr))
    }
}

/// Step-by-step tracing, promoted to info level when the target opts into
/// verbose tracing via its `debug` flag.
fn step(target: &DeployTarget, message: std::fmt::Arguments<'_>) {
    if target.debug {
        info!("{message}");
    } else {
        debug!("{message}");
    }
}

/// Strip trailing line-ending characters from a remote command's output.
fn trim_line_endings(output: &str) -> &str {
    output.trim_end_matches(['\r', '\n'])
}

/// Pull the container id out of `docker ps` tabular output: second line,
/// first whitespace-delimited field.
fn parse_container_id(listing: &str) -> Option<String> {
    let row = listing.lines().nth(1)?;
    let id = row.split_whitespace().next()?;
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

fn is_permission_denied(text: &str) -> bool {
    text.contains("Permission denied")
}

/// Resolve a configured local path against the current directory.
fn absolutize(path: &str, kind: ErrorKind) -> Result<PathBuf> {
    let path = Path::new(path);
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| {
        DeployError::new(
            kind,
            format!("cannot resolve local path {}", path.display()),
            e.to_string(),
        )
    })?;
    Ok(cwd.join(path))
}

fn base_name(path: &Path, kind: ErrorKind) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            DeployError::new(
                kind,
                format!("cannot determine base name of {}", path.display()),
                "path has no final component",
            )
        })
}

/// Join remote path segments. Remote hosts are unix; local path semantics
/// must not leak in.
fn remote_join(base: &str, name: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), name)
}
