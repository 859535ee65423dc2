use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, instrument};

use pysetup_isolate::{OutOfProcess, PythonFunction};

use crate::{Environment, Error, SetupInformation};

static RUN_SETUP_PY: PythonFunction = PythonFunction::new(
    "run_setup_py",
    "run_setup_py.py",
    include_str!("run_setup_py.py"),
);

/// Stop once the command line has been parsed, before any command runs.
const STOP_AFTER: &str = "config";
const SCRIPT_ARGS: &[&str] = &["--dry-run"];

#[derive(Debug, Serialize)]
struct RunSetupPy<'a> {
    cwd: &'a Path,
    env: &'a Environment,
    script_args: &'a [&'a str],
    stop_after: &'a str,
}

/// Returns the absolute path of a `setup.py` script.
///
/// The script itself doesn't need to exist yet; a missing script is reported by the dry-run.
pub(crate) fn setup_py_location(setup_py: &Path) -> Result<PathBuf, Error> {
    if setup_py.file_name() != Some(OsStr::new("setup.py")) {
        return Err(Error::NotSetupPy(setup_py.to_path_buf()));
    }
    Ok(std::path::absolute(setup_py)?)
}

/// Dry-run a `setup.py` script in a fresh interpreter and capture its configuration.
///
/// The interpreter is started with exactly the variables of `environment`, and the script
/// runs with its parent directory as working directory. This call is not cached; see [`crate::get_setup_information`].
#[instrument(skip_all, fields(setup_py = %setup_py.display()))]
pub fn capture(
    out_of_process: &OutOfProcess,
    setup_py: &Path,
    environment: &Environment,
) -> Result<SetupInformation, Error> {
    let setup_py = setup_py_location(setup_py)?;
    let Some(cwd) = setup_py.parent() else {
        return Err(Error::NotSetupPy(setup_py));
    };

    debug!("Running `setup.py` in `{}`", cwd.display());
    let kwargs = RunSetupPy {
        cwd,
        env: environment,
        script_args: SCRIPT_ARGS,
        stop_after: STOP_AFTER,
    };
    out_of_process
        .call_with_env(&RUN_SETUP_PY, &kwargs, environment.iter())
        .map_err(|err| Error::Capture {
            setup_py: setup_py.clone(),
            err,
        })
}
