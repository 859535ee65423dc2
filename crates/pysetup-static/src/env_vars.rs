/// Declares all environment variables read by the `pysetup` crates.
pub struct EnvVars;

impl EnvVars {
    /// The Python interpreter used to dry-run `setup.py` scripts.
    ///
    /// If unset, the first `python3` (or `python`) on the `PATH` is used.
    pub const PYSETUP_PYTHON: &'static str = "PYSETUP_PYTHON";

    /// Maximum time, in seconds, a single `setup.py` capture may take before the child
    /// process is killed.
    ///
    /// By default captures are not bounded.
    pub const PYSETUP_CAPTURE_TIMEOUT: &'static str = "PYSETUP_CAPTURE_TIMEOUT";
}
