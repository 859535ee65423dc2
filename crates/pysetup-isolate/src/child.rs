use std::io;
use std::ops::{Deref, DerefMut};
use std::process::{Child, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};

use tracing::warn;

/// Exclusive owner of a child process that kills and reaps it when dropped.
///
/// Every exit path out of a call, including errors and panics, goes through [`Drop`], so no
/// child outlives the call that spawned it.
#[derive(Debug)]
pub(crate) struct ChildGuard(Child);

impl ChildGuard {
    pub(crate) fn new(child: Child) -> Self {
        Self(child)
    }

    /// Kill the child unless it has already exited, then wait for it.
    pub(crate) fn terminate(&mut self) -> io::Result<ExitStatus> {
        if let Some(status) = self.0.try_wait()? {
            return Ok(status);
        }
        match self.0.kill() {
            Ok(()) => {}
            // Exited between `try_wait` and `kill`.
            Err(err) if err.kind() == io::ErrorKind::InvalidInput => {}
            Err(err) => return Err(err),
        }
        self.0.wait()
    }

    /// Wait for the child to exit, giving up at `deadline`.
    ///
    /// Returns `None` if the child is still running at `deadline`; it is then killed on drop.
    pub(crate) fn wait_until(&mut self, deadline: Instant) -> io::Result<Option<ExitStatus>> {
        loop {
            if let Some(status) = self.0.try_wait()? {
                return Ok(Some(status));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            thread::sleep((deadline - now).min(Duration::from_millis(10)));
        }
    }
}

impl Deref for ChildGuard {
    type Target = Child;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for ChildGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Err(err) = self.terminate() {
            warn!("Failed to terminate process {}: {err}", self.0.id());
        }
    }
}
