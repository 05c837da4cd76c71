//! Provider command execution
//!
//! The [`CommandDispatcher`] turns an [`Operation`] into a shell command
//! line by filling the provider's template, runs it through a
//! [`CommandRunner`] and classifies the result. Only the placeholders an
//! operation declares may appear in its template; anything else is
//! rejected before a process is started.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::{BmcError, Result};
use crate::provider::{Operation, ProviderConfig};

/// Named values substituted into a command template
pub type Substitutions = HashMap<&'static str, String>;

/// Captured result of one command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Exit code; a child killed by a signal reports the negative signal number
    pub exit_code: i32,
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output
    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Executes a shell command line
///
/// Implementations return the captured output for any exit status and
/// only fail when the command could not be run or did not finish in time.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` and wait for it
    async fn run(&self, command: &str, timeout: Option<Duration>) -> Result<CommandOutput>;
}

/// Runs commands with `sh -c`
#[derive(Debug, Clone)]
pub struct ShellRunner {
    /// Bytes kept per stream
    max_output_bytes: usize,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new(Settings::default().max_output_bytes)
    }
}

impl ShellRunner {
    /// Create a runner that keeps at most `max_output_bytes` of each stream
    pub fn new(max_output_bytes: usize) -> Self {
        Self { max_output_bytes }
    }

    /// Shell invocation for display and error messages
    pub fn command_line(command: &str) -> String {
        format!("sh -c {}", command)
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str, timeout: Option<Duration>) -> Result<CommandOutput> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        // own process group, so a timeout reaches everything the shell started
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| BmcError::CommandSpawn {
            command: Self::command_line(command),
            source,
        })?;
        let pid = child.id();

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let limit = self.max_output_bytes;

        let completion = async {
            let (stdout, stderr, status) = tokio::join!(
                read_bounded(stdout, limit),
                read_bounded(stderr, limit),
                child.wait()
            );
            let spawn_err = |source: std::io::Error| BmcError::CommandSpawn {
                command: Self::command_line(command),
                source,
            };
            Ok::<_, BmcError>((
                stdout.map_err(spawn_err)?,
                stderr.map_err(spawn_err)?,
                status.map_err(spawn_err)?,
            ))
        };

        let ((stdout, stdout_truncated), (stderr, _), status) = match timeout {
            Some(duration) => match tokio::time::timeout(duration, completion).await {
                Ok(result) => result?,
                Err(_) => {
                    if let Some(pid) = pid {
                        kill_process_group(pid);
                    }
                    return Err(BmcError::CommandTimeout {
                        command: Self::command_line(command),
                        timeout: duration,
                    });
                }
            },
            None => completion.await?,
        };

        if stdout_truncated {
            warn!(
                "Output of '{}' exceeded {} bytes and was truncated",
                command, limit
            );
        }

        Ok(CommandOutput {
            exit_code: exit_code(&status),
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }
}

/// Read up to `limit` bytes and discard the rest so the child never blocks
async fn read_bounded<R: AsyncRead + Unpin>(
    reader: Option<R>,
    limit: usize,
) -> std::io::Result<(Vec<u8>, bool)> {
    let Some(mut reader) = reader else {
        return Ok((Vec::new(), false));
    };

    let mut buf = Vec::new();
    (&mut reader).take(limit as u64).read_to_end(&mut buf).await?;
    let discarded = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;
    Ok((buf, discarded > 0))
}

#[cfg(unix)]
fn exit_code(status: &std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| -signal))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: &std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pgid) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        debug!("Cannot kill process group {}: {}", pgid, e);
    }
}

// the shell itself is still killed on drop
#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}

/// Fill `%(key)s` placeholders in a command template
///
/// `%%` renders a literal `%`. A placeholder outside `allowed`, or one with
/// no value in `substitutions`, fails with [`BmcError::UnknownPlaceholder`];
/// any other `%` sequence fails with [`BmcError::MalformedTemplate`].
/// Values are inserted verbatim.
pub fn render_template(
    template: &str,
    allowed: &[&str],
    substitutions: &Substitutions,
) -> Result<String> {
    let malformed = |message: &str| BmcError::MalformedTemplate {
        template: template.to_string(),
        message: message.to_string(),
    };

    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find('%') {
        rendered.push_str(&rest[..pos]);
        rest = &rest[pos + 1..];

        if let Some(after) = rest.strip_prefix('%') {
            rendered.push('%');
            rest = after;
            continue;
        }

        let Some(after_paren) = rest.strip_prefix('(') else {
            return Err(malformed("'%' must be followed by '(' or '%'"));
        };
        let Some(close) = after_paren.find(')') else {
            return Err(malformed("unterminated placeholder"));
        };
        let key = &after_paren[..close];
        let Some(after_key) = after_paren[close + 1..].strip_prefix('s') else {
            return Err(malformed("placeholders must have the form %(key)s"));
        };

        let value = allowed
            .contains(&key)
            .then(|| substitutions.get(key))
            .flatten()
            .ok_or_else(|| BmcError::UnknownPlaceholder {
                template: template.to_string(),
                key: key.to_string(),
            })?;

        rendered.push_str(value);
        rest = after_key;
    }

    rendered.push_str(rest);
    Ok(rendered)
}

/// Runs provider commands for one provider
#[derive(Clone)]
pub struct CommandDispatcher {
    provider: Arc<ProviderConfig>,
    runner: Arc<dyn CommandRunner>,
    timeout: Option<Duration>,
}

impl CommandDispatcher {
    /// Create a dispatcher using `sh -c` and the given settings
    pub fn new(provider: Arc<ProviderConfig>, settings: &Settings) -> Self {
        Self {
            provider,
            runner: Arc::new(ShellRunner::new(settings.max_output_bytes)),
            timeout: settings.command_timeout,
        }
    }

    /// Replace the command runner
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Set or clear the command timeout
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Provider whose templates are used
    pub fn provider(&self) -> &Arc<ProviderConfig> {
        &self.provider
    }

    /// Command line that `run` would execute
    pub fn render(&self, op: Operation, substitutions: &Substitutions) -> Result<String> {
        let template = self
            .provider
            .template(op)
            .ok_or_else(|| BmcError::ProviderMissingOption {
                name: self.provider.name().to_string(),
                section: op.section().to_string(),
                option: op.action().to_string(),
            })?;
        render_template(template, op.allowed_placeholders(), substitutions)
    }

    /// Run the command for `op` and return its trimmed standard output
    pub async fn run(&self, op: Operation, substitutions: &Substitutions) -> Result<String> {
        let command = self.render(op, substitutions)?;
        debug!("Cmdline for {}: {}", op, ShellRunner::command_line(&command));

        let output = self.runner.run(&command, self.timeout).await?;

        if output.exit_code != 0 {
            if !output.stderr.trim().is_empty() {
                warn!(
                    "Command for {} exited with {}: {}",
                    op,
                    output.exit_code,
                    output.stderr.trim()
                );
            }
            return Err(BmcError::CommandFailed {
                command: ShellRunner::command_line(&command),
                exitcode: output.exit_code,
                stderr: output.stderr,
            });
        }

        let stdout = output.stdout.trim().to_string();
        debug!("Cmdline output for {}: {}", op, stdout);
        Ok(stdout)
    }
}

impl std::fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("provider", &self.provider.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Runner that records command lines and replays scripted outputs
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct RecordingRunner {
        commands: Mutex<Vec<String>>,
        outputs: Mutex<HashMap<String, CommandOutput>>,
    }

    impl RecordingRunner {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        /// Answer `command` with `output`; unknown commands succeed silently
        pub(crate) fn respond(self, command: &str, output: CommandOutput) -> Self {
            self.outputs
                .lock()
                .unwrap()
                .insert(command.to_string(), output);
            self
        }

        pub(crate) fn commands(&self) -> Vec<String> {
            self.commands.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for RecordingRunner {
        async fn run(&self, command: &str, _timeout: Option<Duration>) -> Result<CommandOutput> {
            self.commands.lock().unwrap().push(command.to_string());
            Ok(self
                .outputs
                .lock()
                .unwrap()
                .get(command)
                .cloned()
                .unwrap_or_default())
        }
    }
}
