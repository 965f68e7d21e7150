//! Interactive command channel.
//!
//! Turns a running remote command's streamed output into a single
//! [`CommandOutcome`], optionally answering exactly one interactive password
//! prompt (the `sudo` case). Prompt handling is an explicit little state
//! machine, [`PromptFilter`], so the protocol is testable without a
//! transport.

use crate::error::TransportError;
use russh::client::Msg;
use russh::{Channel, ChannelMsg};

/// Result of one remote command execution.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    /// Whether the remote command exited with status 0
    pub success: bool,

    /// Accumulated standard output
    pub stdout: String,

    /// Accumulated standard error (empty if nothing ever arrived)
    pub stderr: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptState {
    /// No password supplied; stdout accumulates untouched
    Disabled,
    /// Watching the stream tail for a prompt signature
    AwaitingPrompt,
    /// Password written once; no further detection, stdout suppressed
    Sent,
}

/// Stdout accumulator with single-shot password-prompt detection.
///
/// When armed with a password, the filter watches the tail of the
/// accumulated output for a colon followed by a single space (the signature
/// of a `Password: ` prompt). On match it asks the caller to send the
/// password, resets the buffer, and never detects again. A caller that
/// supplies a password opts into prompt-suppression semantics: output after
/// the prompt is dropped, so the final stdout excludes everything around it.
#[derive(Debug)]
pub struct PromptFilter {
    state: PromptState,
    buffer: String,
}

impl PromptFilter {
    /// Create a filter; `armed` is whether a password is available to send.
    pub fn new(armed: bool) -> Self {
        Self {
            state: if armed {
                PromptState::AwaitingPrompt
            } else {
                PromptState::Disabled
            },
            buffer: String::new(),
        }
    }

    /// Feed one stdout chunk. Returns `true` exactly once, when the prompt
    /// signature is detected and the password should be written now.
    pub fn push(&mut self, chunk: &str) -> bool {
        match self.state {
            PromptState::Disabled => {
                self.buffer.push_str(chunk);
                false
            }
            PromptState::AwaitingPrompt => {
                self.buffer.push_str(chunk);
                if self.buffer.ends_with(": ") {
                    self.buffer.clear();
                    self.state = PromptState::Sent;
                    true
                } else {
                    false
                }
            }
            PromptState::Sent => false,
        }
    }

    /// Consume the filter, yielding the accumulated stdout text.
    pub fn into_stdout(self) -> String {
        self.buffer
    }
}

/// A remote command in flight.
///
/// Produced by [`RemoteSession::exec`](crate::session::RemoteSession::exec);
/// consumed once to completion.
pub struct CommandChannel {
    channel: Channel<Msg>,
}

impl CommandChannel {
    pub(crate) fn new(channel: Channel<Msg>) -> Self {
        Self { channel }
    }

    /// Drive the command to completion.
    ///
    /// Stdout and stderr chunks accumulate in arrival order. If `password`
    /// is supplied, the prompt protocol above applies and the password is
    /// written (newline-terminated) at most once. Exit status 0 resolves a
    /// success carrying stdout; any other status resolves a failure outcome
    /// carrying stderr.
    pub async fn consume(
        mut self,
        password: Option<&str>,
    ) -> Result<CommandOutcome, TransportError> {
        let mut filter = PromptFilter::new(password.is_some());
        let mut stderr = String::new();
        let mut exit_status: Option<u32> = None;

        while let Some(msg) = self.channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => {
                    let chunk = String::from_utf8_lossy(&data[..]);
                    if filter.push(&chunk) {
                        if let Some(password) = password {
                            let answer = format!("{password}\n");
                            self.channel.data(answer.as_bytes()).await?;
                        }
                    }
                }
                ChannelMsg::ExtendedData { ref data, ext: 1 } => {
                    stderr.push_str(&String::from_utf8_lossy(&data[..]));
                }
                ChannelMsg::ExitStatus { exit_status: code } => {
                    exit_status = Some(code);
                }
                _ => {}
            }
        }

        let success = exit_status.unwrap_or(0) == 0;
        Ok(CommandOutcome {
            success,
            stdout: filter.into_stdout(),
            stderr,
        })
    }
}
