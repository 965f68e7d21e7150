//! Batch dispatch across independent targets.
//!
//! Targets are deployed strictly one at a time, in input order; a failure on
//! one host is isolated from the next attempt and never aborts the batch.
//! Result slots correspond positionally to the input list. An explicit
//! opt-in bounded-concurrency mode exists for large fleets; it keeps the
//! positional guarantee through an indexed result buffer.

use crate::config::DeployTarget;
use crate::deploy::deploy;
use crate::error::DeployError;
use futures::StreamExt;
use tracing::{info, warn};

/// One slot per target, in input order: `None` on success, the error
/// otherwise.
pub type BatchResult = Vec<Option<DeployError>>;

/// Deploy every target in sequence.
///
/// Target i+1 starts only after target i has finished and its session is
/// closed. The returned vector always has one slot per input target.
pub async fn run_all(targets: &[DeployTarget]) -> BatchResult {
    let mut results = Vec::with_capacity(targets.len());
    for (index, target) in targets.iter().enumerate() {
        match deploy(target).await {
            Ok(()) => {
                info!("target {} ({}) deployed", index + 1, target.host);
                results.push(None);
            }
            Err(e) => {
                warn!("target {} ({}) failed: {e}", index + 1, target.host);
                results.push(Some(e));
            }
        }
    }
    results
}

/// Deploy targets with at most `limit` in flight at once.
///
/// Each in-flight target owns its own session and workspace; results are
/// written into an indexed buffer so slot i still corresponds to target i
/// regardless of completion order. `limit <= 1` degrades to the sequential
/// dispatcher.
pub async fn run_all_concurrent(targets: &[DeployTarget], limit: usize) -> BatchResult {
    if limit <= 1 {
        return run_all(targets).await;
    }

    let mut results: BatchResult = vec![None; targets.len()];
    let mut outcomes = futures::stream::iter(targets.iter().enumerate())
        .map(|(index, target)| async move { (index, deploy(target).await) })
        .buffer_unordered(limit);

    while let Some((index, outcome)) = outcomes.next().await {
        match outcome {
            Ok(()) => info!("target {} ({}) deployed", index + 1, targets[index].host),
            Err(ref e) => warn!("target {} ({}) failed: {e}", index + 1, targets[index].host),
        }
        results[index] = outcome.err();
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn target(host: &str, port: u16, remote_static: &str) -> DeployTarget {
        serde_json::from_value(serde_json::json!({
            "host": host,
            "port": port,
            "username": "u",
            "password": "p",
            "dist": "/local/app",
            "remoteStatic": remote_static
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_failures_are_isolated_and_positional() {
        // Slot 1: validation failure. Slot 2: connection refused.
        // Slot 3: validation failure again. Three slots, three independent
        // outcomes, no early abort.
        let targets = vec![
            target("127.0.0.1", 1, "*"),
            target("127.0.0.1", 1, "/srv/static"),
            target("127.0.0.1", 1, "  "),
        ];
        let results = run_all(&targets).await;

        assert_eq!(results.len(), 3);
        assert_eq!(
            results[0].as_ref().unwrap().kind,
            ErrorKind::IllegalArgument
        );
        assert_eq!(results[1].as_ref().unwrap().kind, ErrorKind::Connection);
        assert_eq!(
            results[2].as_ref().unwrap().kind,
            ErrorKind::IllegalArgument
        );
    }

    #[tokio::test]
    async fn test_empty_batch_yields_empty_result() {
        let results = run_all(&[]).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_mode_preserves_slot_order() {
        let targets = vec![
            target("127.0.0.1", 1, "/srv/a"),
            target("127.0.0.1", 1, "/"),
            target("127.0.0.1", 1, "/srv/c"),
        ];
        let results = run_all_concurrent(&targets, 3).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().kind, ErrorKind::Connection);
        assert_eq!(
            results[1].as_ref().unwrap().kind,
            ErrorKind::IllegalArgument
        );
        assert_eq!(results[2].as_ref().unwrap().kind, ErrorKind::Connection);
    }

    #[tokio::test]
    async fn test_concurrent_limit_one_is_sequential() {
        let targets = vec![target("127.0.0.1", 1, "/")];
        let results = run_all_concurrent(&targets, 1).await;
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].as_ref().unwrap().kind,
            ErrorKind::IllegalArgument
        );
    }
}
