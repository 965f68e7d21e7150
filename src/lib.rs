//! # fast-deploy
//!
//! Push a build artifact from the local machine to remote hosts over SSH,
//! placing the result either directly on the host filesystem or inside a
//! running container.
//!
//! ## Architecture
//!
//! ```text
//! batch dispatcher
//!     └── per target, in order:
//!         validation gate ── deployment pipeline
//!                               ├── remote session (ssh + sftp)
//!                               └── interactive command channel
//!                                   (single-shot sudo password prompt)
//! ```
//!
//! Each target owns its own session and an ephemeral remote workspace; the
//! workspace is removed on every exit path and the session is closed exactly
//! once. One target's failure is fully isolated from the next target's
//! attempt, and every failure is reported as a [`DeployError`] value with a
//! machine-readable [`ErrorKind`] rather than a panic.
//!
//! ```no_run
//! use fast_deploy::{BatchConfig, run_all};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config: BatchConfig = serde_json::from_str(
//!     r#"{"host": "h", "port": 22, "username": "u", "password": "p",
//!         "dist": "./build", "remoteStatic": "/srv/static"}"#,
//! )?;
//! let results = run_all(&config.into_targets()).await;
//! for error in results.iter().flatten() {
//!     eprintln!("{error}");
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod channel;
pub mod config;
pub mod deploy;
pub mod error;
pub mod session;

// Batch dispatch
pub use batch::{BatchResult, run_all, run_all_concurrent};

// Single-target orchestration
pub use deploy::deploy;

// Configuration
pub use config::{BatchConfig, DeployTarget};

// Error handling
pub use error::{DeployError, ErrorKind, Result, TransportError};

// Remote execution
pub use channel::{CommandChannel, CommandOutcome, PromptFilter};
pub use session::RemoteSession;
