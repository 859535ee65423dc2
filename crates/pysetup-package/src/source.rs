use std::fmt::{Debug, Formatter};
use std::path::Path;
use std::sync::Arc;

use pysetup_capture::{Environment, SetupInformation, get_setup_information};

type SourceFn = dyn Fn(&Path, &Environment) -> Result<Arc<SetupInformation>, pysetup_capture::Error>
    + Send
    + Sync;

/// Where the extensions read `setup.py` configurations from.
///
/// Defaults to the process-wide cache ([`get_setup_information`]).
#[derive(Clone)]
pub struct SetupInformationSource(Arc<SourceFn>);

impl SetupInformationSource {
    pub fn new<F>(source: F) -> Self
    where
        F: Fn(&Path, &Environment) -> Result<Arc<SetupInformation>, pysetup_capture::Error>
            + Send
            + Sync
            + 'static,
    {
        Self(Arc::new(source))
    }

    pub fn get(
        &self,
        setup_py: &Path,
        environment: &Environment,
    ) -> Result<Arc<SetupInformation>, pysetup_capture::Error> {
        (self.0)(setup_py, environment)
    }
}

impl Default for SetupInformationSource {
    fn default() -> Self {
        Self::new(get_setup_information)
    }
}

impl Debug for SetupInformationSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SetupInformationSource").finish_non_exhaustive()
    }
}
