use std::path::PathBuf;

use tracing::debug;

use pysetup_static::EnvVars;

use crate::Error;

/// Find the Python interpreter used to run functions out of process.
///
/// Uses [`EnvVars::PYSETUP_PYTHON`] if set, either a path or a name to look up on the `PATH`.
/// Otherwise picks `python3`, then `python` from the `PATH`.
///
/// The path is not canonicalized: resolving the symlinks of a virtual environment's interpreter
/// would escape the environment.
pub fn find_python() -> Result<PathBuf, Error> {
    let python = if let Some(requested) = std::env::var_os(EnvVars::PYSETUP_PYTHON) {
        let requested = PathBuf::from(requested);
        which::which(&requested).map_err(|err| Error::PythonNotFound(requested, err))?
    } else {
        which::which("python3")
            .or_else(|_| which::which("python"))
            .map_err(Error::NoPython)?
    };
    debug!("Using Python interpreter: {}", python.display());
    Ok(std::path::absolute(python)?)
}
