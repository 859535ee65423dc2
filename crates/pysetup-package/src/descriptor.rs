use std::collections::{BTreeMap, HashSet};
use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pysetup_capture::{Environment, SetupInformation};
use pysetup_requirement::DependencyDescriptor;

use crate::SetupInformationSource;

/// A package discovered in a directory, filled in by identification and augmentation
/// extensions.
#[derive(Debug, Clone, Default)]
pub struct PackageDescriptor {
    pub path: PathBuf,
    /// The package type, e.g. `python`, once an extension has claimed the package.
    pub package_type: Option<String>,
    pub name: Option<String>,
    /// Dependencies by kind, e.g. `build`, `run` or `test`.
    pub dependencies: BTreeMap<String, HashSet<DependencyDescriptor>>,
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl PackageDescriptor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// The dependencies of the given kind, if the kind has been set.
    pub fn dependencies(&self, kind: &str) -> Option<&HashSet<DependencyDescriptor>> {
        self.dependencies.get(kind)
    }

    /// The metadata entry for `key` if it is text.
    pub fn metadata_text(&self, key: &str) -> Option<&str> {
        match self.metadata.get(key)? {
            MetadataValue::Text(text) => Some(text),
            MetadataValue::SetupOptions(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum MetadataValue {
    Text(String),
    SetupOptions(SetupOptionsGetter),
}

/// Re-reads the configuration of one `setup.py` under a caller-supplied environment.
#[derive(Clone)]
pub struct SetupOptionsGetter {
    setup_py: PathBuf,
    source: SetupInformationSource,
}

impl SetupOptionsGetter {
    pub(crate) fn new(setup_py: PathBuf, source: SetupInformationSource) -> Self {
        Self { setup_py, source }
    }

    /// The script this getter reads.
    pub fn setup_py(&self) -> &Path {
        &self.setup_py
    }

    /// The configuration of the script when run with exactly `environment`.
    pub fn get(
        &self,
        environment: &Environment,
    ) -> Result<Arc<SetupInformation>, pysetup_capture::Error> {
        self.source.get(&self.setup_py, environment)
    }
}

impl Debug for SetupOptionsGetter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetupOptionsGetter")
            .field("setup_py", &self.setup_py)
            .finish_non_exhaustive()
    }
}
