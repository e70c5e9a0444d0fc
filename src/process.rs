//! Subprocess execution utilities.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;

use anyhow::{bail, Context, Result};
use thiserror::Error;

/// Error raised when a checked invocation exits with a non-zero status.
#[derive(Debug, Error)]
#[error("`{command}` exited with status {code}")]
pub struct ExitError {
    /// Exit code reported by the child.
    pub code: i32,
    /// The rendered command line.
    pub command: String,
    /// Combined stdout/stderr captured while streaming.
    pub output: String,
}

/// Result of a completed invocation. Immutable once produced.
#[derive(Debug, Clone)]
pub struct Completed {
    /// Exit code reported by the child.
    pub code: i32,
    /// Combined stdout/stderr in arrival order.
    pub output: String,
    /// The rendered command line.
    pub command: String,
}

impl Completed {
    /// Whether the child exited with status zero.
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Builder for subprocess execution with live output streaming.
///
/// The child inherits the parent environment; `env` entries are layered on
/// top. Stdout and stderr are merged into a single arrival-ordered stream
/// that is logged line-by-line while the child is still running.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<String>,
    env: HashMap<String, String>,
    cwd: Option<PathBuf>,
    check: bool,
}

impl ProcessBuilder {
    /// Create a new process builder for the given program.
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
            check: true,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    /// Set an environment variable on the child.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env
            .insert(key.as_ref().to_string(), value.as_ref().to_string());
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    /// Control whether a non-zero exit status is raised as an error.
    pub fn check(mut self, check: bool) -> Self {
        self.check = check;
        self
    }

    /// Get the program path.
    pub fn get_program(&self) -> &Path {
        &self.program
    }

    /// Get the arguments.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Get an environment variable set on the builder, if any.
    pub fn get_env(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    /// Get the working directory, if set.
    pub fn get_cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Build the Command.
    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.envs(&self.env);

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        cmd
    }

    /// Execute the command, streaming its merged output to the log.
    ///
    /// Each line of stdout or stderr is logged at info level as soon as it
    /// arrives and accumulated into [`Completed::output`]. Blocks until the
    /// child exits and both streams are drained. When `check` is set, a
    /// non-zero exit status is returned as an [`ExitError`].
    pub fn exec_streamed(&self) -> Result<Completed> {
        tracing::info!(
            "Executing command: \"{}\" in directory: \"{}\"",
            self.display_command(),
            self.cwd
                .as_deref()
                .map_or_else(|| ".".to_string(), |p| p.display().to_string()),
        );

        let mut cmd = self.build_command();
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn `{}`", self.program.display()))?;

        // One reader thread per pipe, funneled into a single channel so the
        // calling thread sees lines in arrival order. The channel closes once
        // both readers hit EOF.
        let (tx, rx) = mpsc::channel();
        let stderr_tx = tx.clone();
        let stdout_reader = child.stdout.take().map(|s| spawn_line_reader(s, tx));
        let stderr_reader = child.stderr.take().map(|s| spawn_line_reader(s, stderr_tx));
        let readers = [stdout_reader, stderr_reader];

        let mut output = String::new();
        for line in rx {
            tracing::info!("{line}");
            output.push_str(&line);
            output.push('\n');
        }

        let mut read_error = None;
        for handle in readers.into_iter().flatten() {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => read_error = Some(e),
                Err(_) => bail!("output reader thread panicked"),
            }
        }

        // Reap the child even if a read failed, so no zombie is left behind.
        let status = child
            .wait()
            .with_context(|| format!("failed to wait for `{}`", self.program.display()))?;

        if let Some(e) = read_error {
            return Err(e)
                .with_context(|| format!("failed reading output of `{}`", self.program.display()));
        }

        // Signal-terminated children have no exit code; report -1.
        let code = status.code().unwrap_or(-1);

        if self.check && code != 0 {
            return Err(ExitError {
                code,
                command: self.display_command(),
                output,
            }
            .into());
        }

        Ok(Completed {
            code,
            output,
            command: self.display_command(),
        })
    }

    /// Display the command for log and error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Read a pipe line-by-line, forwarding each complete line to `tx`.
///
/// Lines are decoded lossily so invalid UTF-8 in a build log never aborts
/// the run. Returns once the pipe hits EOF or the receiver goes away.
fn spawn_line_reader<R: Read + Send + 'static>(
    stream: R,
    tx: mpsc::Sender<String>,
) -> thread::JoinHandle<std::io::Result<()>> {
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                return Ok(());
            }
            while matches!(buf.last(), Some(b'\n' | b'\r')) {
                buf.pop();
            }
            if tx.send(String::from_utf8_lossy(&buf).into_owned()).is_err() {
                return Ok(());
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_streamed_captures_output() {
        let completed = ProcessBuilder::new("echo")
            .arg("hello")
            .exec_streamed()
            .unwrap();

        assert!(completed.success());
        assert_eq!(completed.code, 0);
        assert!(completed.output.contains("hello"));
    }

    #[test]
    fn test_display_command() {
        let pb = ProcessBuilder::new("./gradlew").args(["assemble", "--stacktrace"]);

        assert_eq!(pb.display_command(), "./gradlew assemble --stacktrace");
    }

    #[test]
    fn test_builder_accessors() {
        let pb = ProcessBuilder::new("./gradlew")
            .arg("build")
            .env("ADB_INSTALL_TIMEOUT", "5")
            .cwd("/tmp");

        assert_eq!(pb.get_program(), Path::new("./gradlew"));
        assert_eq!(pb.get_args(), ["build"]);
        assert_eq!(pb.get_env("ADB_INSTALL_TIMEOUT"), Some("5"));
        assert_eq!(pb.get_env("GRADLE_OPTS"), None);
        assert_eq!(pb.get_cwd(), Some(Path::new("/tmp")));
    }

    #[test]
    fn test_spawn_failure_is_not_exit_error() {
        let err = ProcessBuilder::new("./no-such-wrapper-script")
            .exec_streamed()
            .unwrap_err();

        assert!(err.downcast_ref::<ExitError>().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_checked_nonzero_exit_raises() {
        let err = ProcessBuilder::new("sh")
            .args(["-c", "exit 3"])
            .exec_streamed()
            .unwrap_err();

        let exit = err.downcast_ref::<ExitError>().unwrap();
        assert_eq!(exit.code, 3);
        assert!(exit.command.contains("sh"));
    }

    #[cfg(unix)]
    #[test]
    fn test_unchecked_nonzero_exit_returns_result() {
        let completed = ProcessBuilder::new("sh")
            .args(["-c", "echo failing; exit 3"])
            .check(false)
            .exec_streamed()
            .unwrap();

        assert!(!completed.success());
        assert_eq!(completed.code, 3);
        assert!(completed.output.contains("failing"));
    }

    #[cfg(unix)]
    #[test]
    fn test_stderr_merged_into_output() {
        let completed = ProcessBuilder::new("sh")
            .args(["-c", "echo out; echo err >&2"])
            .exec_streamed()
            .unwrap();

        assert!(completed.output.contains("out"));
        assert!(completed.output.contains("err"));
    }
}
