//! Package identification and augmentation for Python packages configured by a legacy
//! `setup.py` script.
//!
//! [`PythonPackageIdentification`] claims a directory containing a `setup.py` as a `python`
//! package and reads its name. [`PythonPackageAugmentation`] then fills the `build`, `run` and
//! `test` dependencies, the version, and a getter for the full configuration under other
//! environments.

use std::path::PathBuf;

use thiserror::Error;

use pysetup_requirement::RequirementError;

pub use crate::augmentation::PythonPackageAugmentation;
pub use crate::descriptor::{MetadataValue, PackageDescriptor, SetupOptionsGetter};
pub use crate::extension::{
    DEFAULT_PRIORITY, PackageAugmentationExtension, PackageIdentificationExtension,
    augment_package, identify_package,
};
pub use crate::identification::PythonPackageIdentification;
pub use crate::source::SetupInformationSource;

mod augmentation;
mod descriptor;
mod extension;
mod identification;
mod source;

/// The package type assigned to packages with a `setup.py`.
pub const PYTHON: &str = "python";

/// The metadata key of the [`SetupOptionsGetter`].
pub const SETUP_OPTIONS_KEY: &str = "get_python_setup_options";

/// Extensions for the `setup.py` format rank below those for the declarative `setup.cfg`
/// format, which use [`DEFAULT_PRIORITY`].
pub const PRIORITY: i32 = 90;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to determine Python package name in '{}'", _0.display())]
    MissingName(PathBuf),
    #[error(
        "Found package name `{found}` but the descriptor is named `{existing}`: Package name already set to different value"
    )]
    NameConflict { existing: String, found: String },
    #[error(transparent)]
    Capture(#[from] pysetup_capture::Error),
    #[error("Invalid requirement in `{field}` of `{}`", .setup_py.display())]
    Requirement {
        setup_py: PathBuf,
        field: &'static str,
        #[source]
        err: RequirementError,
    },
    #[error(transparent)]
    Extension(Box<dyn std::error::Error + Send + Sync>),
}
