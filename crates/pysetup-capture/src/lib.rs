//! Dry-run legacy `setup.py` scripts and capture the configuration they declare.
//!
//! The script runs through `distutils.core.run_setup` with `--dry-run` and stops as soon as its
//! configuration has been assembled, inside a disposable interpreter (see [`pysetup_isolate`]).
//! Results are cached for the lifetime of the process, per script and environment.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use crate::cache::{
    SetupInformationCache, clear_setup_information_cache, get_setup_information,
};
pub use crate::environment::Environment;
pub use crate::runner::capture;
pub use crate::setup_information::{DistributionMetadata, SetupInformation};

mod cache;
mod environment;
mod runner;
mod setup_information;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Expected the path to a `setup.py` file, found `{}`", _0.display())]
    NotSetupPy(PathBuf),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("Failed to dry-run `{}`:\n{err}", .setup_py.display())]
    Capture {
        setup_py: PathBuf,
        err: pysetup_isolate::Error,
    },
}
