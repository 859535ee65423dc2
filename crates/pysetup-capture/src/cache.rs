use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use tracing::{debug, trace};

use pysetup_isolate::OutOfProcess;
use pysetup_once_map::OnceMap;

use crate::runner::setup_py_location;
use crate::{Environment, Error, SetupInformation};

/// Process-wide cache behind [`get_setup_information`].
static SETUP_INFORMATION: LazyLock<SetupInformationCache> =
    LazyLock::new(SetupInformationCache::default);

/// Dry-run `setup_py` under `environment` and return its configuration, at most once per
/// script and environment for the lifetime of the process.
///
/// Concurrent requests for the same script and environment share one dry-run. Failed dry-runs
/// are not cached: the next request tries again.
pub fn get_setup_information(
    setup_py: &Path,
    environment: &Environment,
) -> Result<Arc<SetupInformation>, Error> {
    SETUP_INFORMATION.get_or_capture(setup_py, environment, |setup_py, environment| {
        let out_of_process = OutOfProcess::from_env().map_err(|err| Error::Capture {
            setup_py: setup_py.to_path_buf(),
            err,
        })?;
        crate::capture(&out_of_process, setup_py, environment)
    })
}

/// Forget every finished entry of the process-wide cache.
///
/// Dry-runs that are still in flight are kept; their callers still receive their result.
pub fn clear_setup_information_cache() {
    SETUP_INFORMATION.clear();
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    setup_py: PathBuf,
    environment: Environment,
}

/// A cache of `setup.py` configurations, keyed by absolute script path and environment.
#[derive(Default)]
pub struct SetupInformationCache {
    entries: OnceMap<CacheKey, Arc<SetupInformation>>,
}

impl SetupInformationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached configuration for `setup_py` under `environment`, or compute it with
    /// `capture`.
    ///
    /// `capture` receives the absolute script path. If another thread is already computing the
    /// same entry, this blocks until it finishes and shares its result; if that computation
    /// fails, the current thread computes the entry itself.
    pub fn get_or_capture<F>(
        &self,
        setup_py: &Path,
        environment: &Environment,
        capture: F,
    ) -> Result<Arc<SetupInformation>, Error>
    where
        F: FnOnce(&Path, &Environment) -> Result<SetupInformation, Error>,
    {
        let key = CacheKey {
            setup_py: setup_py_location(setup_py)?,
            environment: environment.clone(),
        };

        loop {
            if let Some(information) = self.entries.get(&key) {
                trace!("Using cached configuration of `{}`", key.setup_py.display());
                return Ok(information);
            }
            if self.entries.register(key.clone()) {
                break;
            }
            if let Some(information) = self.entries.wait_blocking(&key) {
                return Ok(information);
            }
            debug!(
                "Concurrent dry-run of `{}` failed, retrying",
                key.setup_py.display()
            );
        }

        let registration = Registration {
            entries: &self.entries,
            key: &key,
        };
        let information = Arc::new(capture(&key.setup_py, &key.environment)?);
        std::mem::forget(registration);
        self.entries.done(key, Arc::clone(&information));
        Ok(information)
    }

    /// Forget every finished entry; in-flight computations are kept.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// The number of finished entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Releases a registered key if the computation fails or panics, waking up its waiters.
struct Registration<'a> {
    entries: &'a OnceMap<CacheKey, Arc<SetupInformation>>,
    key: &'a CacheKey,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.entries.abandon(self.key);
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::time::Duration;

    use crate::{Environment, Error, SetupInformation};

    use super::SetupInformationCache;

    fn named(name: &str) -> SetupInformation {
        let mut information = SetupInformation::default();
        information.metadata.name = Some(name.to_string());
        information
    }

    #[test]
    fn hit() {
        let cache = SetupInformationCache::new();
        let environment = Environment::from_iter([("A", "1")]);
        let calls = AtomicUsize::new(0);
        let capture = |_: &Path, _: &Environment| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(named("pkg"))
        };

        let first = cache
            .get_or_capture(Path::new("pkg/setup.py"), &environment, capture)
            .unwrap();
        let second = cache
            .get_or_capture(Path::new("pkg/setup.py"), &environment, capture)
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn relative_and_absolute_share_an_entry() {
        let cache = SetupInformationCache::new();
        let environment = Environment::default();
        let absolute = std::path::absolute("pkg/setup.py").unwrap();

        let first = cache
            .get_or_capture(Path::new("pkg/setup.py"), &environment, |setup_py, _| {
                assert!(setup_py.is_absolute());
                Ok(named("pkg"))
            })
            .unwrap();
        let second = cache
            .get_or_capture(&absolute, &environment, |_, _| unreachable!())
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn environment_is_part_of_the_key() {
        let cache = SetupInformationCache::new();
        let capture = |_: &Path, environment: &Environment| {
            Ok(named(environment.get("NAME").unwrap_or_default()))
        };

        let first = cache
            .get_or_capture(
                Path::new("setup.py"),
                &Environment::from_iter([("NAME", "first")]),
                capture,
            )
            .unwrap();
        let second = cache
            .get_or_capture(
                Path::new("setup.py"),
                &Environment::from_iter([("NAME", "second")]),
                capture,
            )
            .unwrap();
        assert_eq!(first.name(), Some("first"));
        assert_eq!(second.name(), Some("second"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failures_are_not_cached() {
        let cache = SetupInformationCache::new();
        let environment = Environment::default();
        let setup_py = Path::new("broken/setup.py");

        let err = cache
            .get_or_capture(setup_py, &environment, |setup_py, _| {
                Err(Error::NotSetupPy(setup_py.to_path_buf()))
            })
            .unwrap_err();
        assert!(matches!(err, Error::NotSetupPy(_)));
        assert!(cache.is_empty());

        let information = cache
            .get_or_capture(setup_py, &environment, |_, _| Ok(named("fixed")))
            .unwrap();
        assert_eq!(information.name(), Some("fixed"));
    }

    #[test]
    fn panics_release_the_entry() {
        let cache = SetupInformationCache::new();
        let environment = Environment::default();
        let setup_py = Path::new("panics/setup.py");

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            cache.get_or_capture(setup_py, &environment, |_, _| panic!("boom"))
        }));
        assert!(result.is_err());

        let information = cache
            .get_or_capture(setup_py, &environment, |_, _| Ok(named("pkg")))
            .unwrap();
        assert_eq!(information.name(), Some("pkg"));
    }

    #[test]
    fn not_a_setup_py() {
        let cache = SetupInformationCache::new();
        let err = cache
            .get_or_capture(
                Path::new("pkg/pyproject.toml"),
                &Environment::default(),
                |_, _| unreachable!(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::NotSetupPy(_)));
    }

    #[test]
    fn clear_forces_a_new_capture() {
        let cache = SetupInformationCache::new();
        let environment = Environment::default();
        let calls = AtomicUsize::new(0);
        let capture = |_: &Path, _: &Environment| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(named("pkg"))
        };

        let first = cache
            .get_or_capture(Path::new("setup.py"), &environment, capture)
            .unwrap();
        cache.clear();
        assert!(cache.is_empty());
        let second = cache
            .get_or_capture(Path::new("setup.py"), &environment, capture)
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_requests_share_one_capture() {
        let cache = SetupInformationCache::new();
        let environment = Environment::default();
        let calls = AtomicUsize::new(0);
        let barrier = Barrier::new(8);

        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        cache
                            .get_or_capture(Path::new("setup.py"), &environment, |_, _| {
                                calls.fetch_add(1, Ordering::SeqCst);
                                std::thread::sleep(Duration::from_millis(50));
                                Ok(named("pkg"))
                            })
                            .unwrap()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|result| Arc::ptr_eq(result, &results[0])));
    }

    #[test]
    fn clear_keeps_in_flight_captures() {
        let cache = SetupInformationCache::new();
        let environment = Environment::default();
        let started = Barrier::new(2);
        let cleared = Barrier::new(2);

        std::thread::scope(|scope| {
            let handle = scope.spawn(|| {
                cache
                    .get_or_capture(Path::new("setup.py"), &environment, |_, _| {
                        started.wait();
                        cleared.wait();
                        Ok(named("pkg"))
                    })
                    .unwrap()
            });
            started.wait();
            cache.clear();
            cleared.wait();
            let information = handle.join().unwrap();
            assert_eq!(information.name(), Some("pkg"));
        });
        assert_eq!(cache.len(), 1);
    }
}
