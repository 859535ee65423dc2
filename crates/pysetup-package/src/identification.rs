use tracing::{debug, instrument};

use pysetup_capture::Environment;

use crate::{
    Error, PRIORITY, PYTHON, PackageDescriptor, PackageIdentificationExtension,
    SetupInformationSource,
};

/// Identifies Python packages with a `setup.py` file.
///
/// Identification only sets the package type and name. Dependencies and metadata are left to
/// [`crate::PythonPackageAugmentation`].
#[derive(Debug, Clone, Default)]
pub struct PythonPackageIdentification {
    source: SetupInformationSource,
}

impl PythonPackageIdentification {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read configurations from `source` instead of the process-wide cache.
    pub fn with_source(source: SetupInformationSource) -> Self {
        Self { source }
    }
}

impl PackageIdentificationExtension for PythonPackageIdentification {
    fn priority(&self) -> i32 {
        PRIORITY
    }

    #[instrument(skip_all, fields(path = %descriptor.path.display()))]
    fn identify(&self, descriptor: &mut PackageDescriptor) -> Result<(), Error> {
        if descriptor
            .package_type
            .as_deref()
            .is_some_and(|package_type| package_type != PYTHON)
        {
            return Ok(());
        }

        let setup_py = descriptor.path.join("setup.py");
        if !setup_py.is_file() {
            return Ok(());
        }

        let information = self.source.get(&setup_py, &Environment::current())?;
        let Some(name) = information.name().filter(|name| !name.is_empty()) else {
            return Err(Error::MissingName(descriptor.path.clone()));
        };
        if let Some(existing) = descriptor.name.as_deref()
            && existing != name
        {
            return Err(Error::NameConflict {
                existing: existing.to_string(),
                found: name.to_string(),
            });
        }

        debug!("Identified Python package `{name}`");
        descriptor.package_type = Some(PYTHON.to_string());
        descriptor.name = Some(name.to_string());
        Ok(())
    }
}
