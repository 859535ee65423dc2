//! Run a Python function in a disposable child process.
//!
//! Dry-running a `setup.py` mutates the working directory, the environment and the imported
//! modules of the interpreter that executes it. [`OutOfProcess`] confines that damage to a
//! short-lived interpreter: the function source and its keyword arguments are sent over the
//! child's stdin, the child reports exactly one tagged payload on a private channel, and the
//! child is killed as soon as the payload has been read.

use std::ffi::OsStr;
use std::io::{self, BufRead, BufReader, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::process::{ChildStdout, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument, trace};

use pysetup_static::EnvVars;

use crate::child::ChildGuard;
use crate::payload::{Payload, Request};
pub use crate::python::find_python;

mod child;
mod payload;
mod python;

/// The wrapper executed by the child interpreter.
static BOOTSTRAP: &str = include_str!("out_of_process.py");

#[derive(Debug, Error)]
pub enum Error {
    #[error(
        "Failed to find a Python interpreter, set `{var}` or add `python3` to the `PATH`",
        var = EnvVars::PYSETUP_PYTHON
    )]
    NoPython(#[source] which::Error),
    #[error("Failed to find the Python interpreter `{}`", _0.display())]
    PythonNotFound(PathBuf, #[source] which::Error),
    #[error(
        "Invalid value for `{var}`, expected a number of seconds: `{0}`",
        var = EnvVars::PYSETUP_CAPTURE_TIMEOUT
    )]
    InvalidTimeout(String, #[source] std::num::ParseIntError),
    #[error("Failed to run `{}`", _0.display())]
    Spawn(PathBuf, #[source] io::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("Failed to serialize the arguments of `{0}`")]
    Encode(&'static str, #[source] serde_json::Error),
    #[error("Failed to decode the result of `{0}`")]
    Decode(&'static str, #[source] serde_json::Error),
    #[error("`{function}` exited with {status} before reporting a result:\n--- stderr:\n{stderr}\n---")]
    Closed {
        function: &'static str,
        status: ExitStatus,
        stderr: String,
    },
    #[error("`{0}` did not report a result within {1:?}")]
    Timeout(&'static str, Duration),
    #[error(transparent)]
    OutOfProcess(#[from] OutOfProcessError),
}

/// An error raised inside the child process.
///
/// The original exception type may not exist outside the child, so only its formatted traceback
/// is kept, verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{description}")]
pub struct OutOfProcessError {
    description: String,
}

impl OutOfProcessError {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }

    /// The formatted traceback reported by the child.
    pub fn description(&self) -> &str {
        &self.description
    }
}

/// A module-level Python function that can be run with [`OutOfProcess::call`].
#[derive(Debug, Clone, Copy)]
pub struct PythonFunction {
    /// The name of the function inside `source`.
    name: &'static str,
    /// The file name shown in tracebacks.
    filename: &'static str,
    /// The module source defining the function.
    source: &'static str,
}

impl PythonFunction {
    pub const fn new(name: &'static str, filename: &'static str, source: &'static str) -> Self {
        Self {
            name,
            filename,
            source,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Runs Python functions in a fresh interpreter per call.
///
/// Holds no mutable state, so a single instance can be shared between threads. Every call pays
/// for one interpreter start.
#[derive(Debug, Clone)]
pub struct OutOfProcess {
    python: PathBuf,
    timeout: Option<Duration>,
}

impl OutOfProcess {
    /// Use the given interpreter, without a timeout.
    pub fn new(python: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
            timeout: None,
        }
    }

    /// Use the interpreter and timeout configured through the environment.
    ///
    /// See [`find_python`] and [`EnvVars::PYSETUP_CAPTURE_TIMEOUT`]. A timeout of `0` disables
    /// the bound.
    pub fn from_env() -> Result<Self, Error> {
        let python = find_python()?;
        let timeout = match std::env::var(EnvVars::PYSETUP_CAPTURE_TIMEOUT) {
            Ok(value) => {
                let seconds = value
                    .trim()
                    .parse::<u64>()
                    .map_err(|err| Error::InvalidTimeout(value.clone(), err))?;
                (seconds > 0).then(|| Duration::from_secs(seconds))
            }
            Err(_) => None,
        };
        Ok(Self::new(python).with_timeout(timeout))
    }

    /// Kill the child if it hasn't reported a result after `timeout`.
    #[must_use]
    pub fn with_timeout(self, timeout: Option<Duration>) -> Self {
        Self { timeout, ..self }
    }

    /// The interpreter used for each call.
    pub fn python(&self) -> &Path {
        &self.python
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Call `function(**kwargs)` in a new interpreter and return its result.
    ///
    /// Blocks until the child reports a result. The child is killed and reaped before this
    /// returns, whether the call succeeded or not. The child inherits the environment of the
    /// current process.
    pub fn call<A, T>(&self, function: &PythonFunction, kwargs: &A) -> Result<T, Error>
    where
        A: Serialize,
        T: DeserializeOwned,
    {
        self.call_in(Command::new(&self.python), function, kwargs)
    }

    /// Like [`OutOfProcess::call`], but start the interpreter with exactly the variables in
    /// `env`.
    ///
    /// Interpreter startup variables such as `PYTHONPATH` or `PYTHONHOME` are taken from `env`
    /// too.
    pub fn call_with_env<A, T, I, K, V>(
        &self,
        function: &PythonFunction,
        kwargs: &A,
        env: I,
    ) -> Result<T, Error>
    where
        A: Serialize,
        T: DeserializeOwned,
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        let mut command = Command::new(&self.python);
        command.env_clear().envs(env);
        self.call_in(command, function, kwargs)
    }

    #[instrument(skip_all, fields(function = function.name))]
    fn call_in<A, T>(
        &self,
        mut command: Command,
        function: &PythonFunction,
        kwargs: &A,
    ) -> Result<T, Error>
    where
        A: Serialize,
        T: DeserializeOwned,
    {
        let request = serde_json::to_vec(&Request {
            function: function.name,
            filename: function.filename,
            source: function.source,
            kwargs,
        })
        .map_err(|err| Error::Encode(function.name, err))?;

        // Anything written to stderr is only read back if the child dies without a result.
        let mut stderr = tempfile::tempfile()?;

        let deadline = self.timeout.map(|timeout| (Instant::now() + timeout, timeout));
        let child = command
            .arg("-c")
            .arg(BOOTSTRAP)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::from(stderr.try_clone()?))
            .spawn()
            .map_err(|err| Error::Spawn(self.python.clone(), err))?;
        let mut child = ChildGuard::new(child);
        debug!(
            "Running `{}` in {} (pid {})",
            function.name,
            self.python.display(),
            child.id()
        );

        {
            let mut stdin = child.stdin.take().expect("stdin is piped");
            match stdin.write_all(&request) {
                Ok(()) => {}
                // The child exited without reading its request, the missing payload tells why.
                Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
                    trace!("Child closed stdin before reading the request");
                }
                Err(err) => return Err(err.into()),
            }
        }

        let stdout = child.stdout.take().expect("stdout is piped");
        let line = match deadline {
            None => read_payload(stdout)?,
            Some((deadline, timeout)) => read_payload_with_timeout(
                stdout,
                deadline.saturating_duration_since(Instant::now()),
            )?
            .ok_or(Error::Timeout(function.name, timeout))?,
        };

        if line.trim().is_empty() {
            // The channel is closed, but the child may still be running.
            let status = match deadline {
                None => child.wait()?,
                Some((deadline, timeout)) => child
                    .wait_until(deadline)?
                    .ok_or(Error::Timeout(function.name, timeout))?,
            };
            let mut output = Vec::new();
            stderr.rewind()?;
            stderr.read_to_end(&mut output)?;
            return Err(Error::Closed {
                function: function.name,
                status,
                stderr: String::from_utf8_lossy(&output).trim().to_string(),
            });
        }

        let status = child.terminate()?;
        trace!("Terminated `{}` with {status}", function.name);

        match serde_json::from_str::<Payload>(&line)
            .map_err(|err| Error::Decode(function.name, err))?
        {
            Payload::Success { value } => {
                serde_json::from_value(value).map_err(|err| Error::Decode(function.name, err))
            }
            Payload::Failure { description } => Err(OutOfProcessError::new(description).into()),
        }
    }
}

/// Read exactly one payload line from the channel.
fn read_payload(stdout: ChildStdout) -> io::Result<String> {
    let mut line = String::new();
    BufReader::new(stdout).read_line(&mut line)?;
    Ok(line)
}

/// Read one payload line, giving up after `timeout`.
///
/// Returns `None` on timeout. The reader thread is detached: it finishes once the child is
/// killed and the channel is closed.
fn read_payload_with_timeout(
    stdout: ChildStdout,
    timeout: Duration,
) -> Result<Option<String>, Error> {
    let (sender, receiver) = mpsc::channel();
    thread::Builder::new()
        .name("pysetup-channel".to_string())
        .spawn(move || {
            // The receiver is gone after a timeout, there is nobody left to tell.
            let _ = sender.send(read_payload(stdout));
        })?;

    match receiver.recv_timeout(timeout) {
        Ok(result) => Ok(Some(result?)),
        Err(RecvTimeoutError::Timeout) => Ok(None),
        Err(RecvTimeoutError::Disconnected) => Err(Error::Io(io::Error::other(
            "the channel reader exited without a result",
        ))),
    }
}
