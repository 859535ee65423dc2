use crate::{Error, PackageDescriptor};

/// The priority of extensions that don't ask for a specific one.
pub const DEFAULT_PRIORITY: i32 = 100;

/// Claims a package directory: sets the package type and name on the descriptor.
pub trait PackageIdentificationExtension {
    /// Extensions with a higher priority run first.
    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }

    /// Identify the package at `descriptor.path`, leaving the descriptor unchanged if the
    /// extension doesn't recognize it.
    fn identify(&self, descriptor: &mut PackageDescriptor) -> Result<(), Error>;
}

/// Adds dependencies and metadata to an identified package.
pub trait PackageAugmentationExtension {
    /// Extensions with a higher priority run first.
    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }

    fn augment_package(&self, descriptor: &mut PackageDescriptor) -> Result<(), Error>;
}

/// Run identification extensions by descending priority until one assigns a package type.
pub fn identify_package(
    extensions: &[&dyn PackageIdentificationExtension],
    descriptor: &mut PackageDescriptor,
) -> Result<(), Error> {
    let mut extensions = extensions.to_vec();
    extensions.sort_by_key(|extension| std::cmp::Reverse(extension.priority()));
    for extension in extensions {
        extension.identify(descriptor)?;
        if descriptor.package_type.is_some() {
            break;
        }
    }
    Ok(())
}

/// Run every augmentation extension by descending priority.
pub fn augment_package(
    extensions: &[&dyn PackageAugmentationExtension],
    descriptor: &mut PackageDescriptor,
) -> Result<(), Error> {
    let mut extensions = extensions.to_vec();
    extensions.sort_by_key(|extension| std::cmp::Reverse(extension.priority()));
    for extension in extensions {
        extension.augment_package(descriptor)?;
    }
    Ok(())
}
