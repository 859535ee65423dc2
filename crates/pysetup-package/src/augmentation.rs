use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, instrument};

use pysetup_capture::Environment;
use pysetup_requirement::DependencyDescriptor;

use crate::{
    Error, MetadataValue, PRIORITY, PYTHON, PackageAugmentationExtension, PackageDescriptor,
    SETUP_OPTIONS_KEY, SetupInformationSource, SetupOptionsGetter,
};

/// Augments Python packages with the dependencies and version declared in their `setup.py`.
#[derive(Debug, Clone, Default)]
pub struct PythonPackageAugmentation {
    source: SetupInformationSource,
}

impl PythonPackageAugmentation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read configurations from `source` instead of the process-wide cache.
    pub fn with_source(source: SetupInformationSource) -> Self {
        Self { source }
    }
}

impl PackageAugmentationExtension for PythonPackageAugmentation {
    fn priority(&self) -> i32 {
        PRIORITY
    }

    #[instrument(skip_all, fields(path = %descriptor.path.display()))]
    fn augment_package(&self, descriptor: &mut PackageDescriptor) -> Result<(), Error> {
        if descriptor.package_type.as_deref() != Some(PYTHON) {
            return Ok(());
        }
        // Already augmented from another configuration format.
        if descriptor.metadata.contains_key(SETUP_OPTIONS_KEY) {
            return Ok(());
        }
        let setup_py = descriptor.path.join("setup.py");
        if !setup_py.is_file() {
            return Ok(());
        }

        let information = self.source.get(&setup_py, &Environment::current())?;

        // Parse everything before touching the descriptor.
        let buckets = [
            ("build", "setup_requires", &information.setup_requires),
            ("run", "install_requires", &information.install_requires),
            ("test", "tests_require", &information.tests_require),
        ]
        .into_iter()
        .map(|(kind, field, requirements)| {
            dependencies(&setup_py, field, requirements).map(|dependencies| (kind, dependencies))
        })
        .collect::<Result<Vec<_>, Error>>()?;

        for (kind, dependencies) in buckets {
            debug!("Found {} {kind} dependencies", dependencies.len());
            descriptor.dependencies.insert(kind.to_string(), dependencies);
        }
        if let Some(version) = &information.metadata.version {
            descriptor
                .metadata
                .insert("version".to_string(), MetadataValue::Text(version.clone()));
        }
        descriptor.metadata.insert(
            SETUP_OPTIONS_KEY.to_string(),
            MetadataValue::SetupOptions(SetupOptionsGetter::new(setup_py, self.source.clone())),
        );
        Ok(())
    }
}

fn dependencies(
    setup_py: &Path,
    field: &'static str,
    requirements: &[String],
) -> Result<HashSet<DependencyDescriptor>, Error> {
    requirements
        .iter()
        .map(|requirement| {
            DependencyDescriptor::from_requirement(requirement).map_err(|err| {
                Error::Requirement {
                    setup_py: setup_py.to_path_buf(),
                    field,
                    err,
                }
            })
        })
        .collect()
}
