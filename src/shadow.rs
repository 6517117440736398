use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use parking_lot::{Mutex, RwLock};

use crate::env::TargetEnv;
use crate::error::Error;
use crate::loader::EnvLoader;
use crate::model::{Conventions, LoadReport};
use crate::toolchain::{CommandRunner, HarnessDetection, SystemRunner};

const DEFAULT_FILE: &str = ".env";

/// An in-process copy of the environment layered over a [`TargetEnv`].
///
/// Reads take a shared lock and writes an exclusive one, so a single value
/// can be shared freely between threads. The only exception is
/// [`temp`](Self::temp), which is documented as unsafe to combine with
/// concurrent access.
pub struct ShadowEnv {
    entries: RwLock<HashMap<String, String>>,
    target: Mutex<TargetEnv>,
    conventions: Conventions,
    harness: HarnessDetection,
    runner: Box<dyn CommandRunner>,
    loader: EnvLoader,
    default_file: PathBuf,
}

impl fmt::Debug for ShadowEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowEnv")
            .field("entries", &self.entries.read().len())
            .field("conventions", &self.conventions)
            .field("harness", &self.harness)
            .field("loader", &self.loader)
            .field("default_file", &self.default_file)
            .finish_non_exhaustive()
    }
}

impl ShadowEnv {
    /// Start configuring a shadow over `target`.
    pub fn builder(target: TargetEnv) -> ShadowEnvBuilder {
        ShadowEnvBuilder::new(target)
    }

    /// Value of `name`, or `fallback` when the shadow has no such variable.
    pub fn get(&self, name: &str, fallback: &str) -> String {
        self.entries
            .read()
            .get(name)
            .cloned()
            .unwrap_or_else(|| fallback.to_owned())
    }

    pub fn must_get(&self, name: &str) -> Result<String, Error> {
        self.entries
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(name))
    }

    /// Set `name` in the shadow only. The target is left untouched.
    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.write().insert(name.into(), value.into());
    }

    /// Set `name` in the target, then in the shadow.
    ///
    /// If the target rejects the write the shadow is left unchanged.
    pub fn must_set(&self, name: &str, value: &str) -> Result<(), Error> {
        let mut entries = self.entries.write();
        self.target.lock().set_var(name, value)?;
        entries.insert(name.to_owned(), value.to_owned());
        Ok(())
    }

    /// Discard the shadow and rebuild it from the target.
    ///
    /// Before copying the target:
    /// - when the mode variable is unset and a test harness is detected, the
    ///   shadow (not the target) records the test mode;
    /// - when the toolchain path variable is unset, the toolchain is asked
    ///   for its default path and the answer is written into the target.
    ///   A failed query or write is ignored.
    ///
    /// The new map replaces the old one under a single write lock, so readers
    /// see either the old or the new contents.
    pub fn reload(&self) {
        let queried_path = self.query_toolchain_path();

        let mut entries = self.entries.write();
        let mut target = self.target.lock();
        let mut fresh = HashMap::new();

        let conventions = &self.conventions;
        if target.get_non_empty(&conventions.mode_var).is_none() && self.harness.detect() {
            fresh.insert(conventions.mode_var.clone(), conventions.test_mode.clone());
        }

        if let Some(path) = queried_path
            && target.get_non_empty(&conventions.path_var).is_none()
            && let Err(err) = target.set_var(&conventions.path_var, &path)
        {
            tracing::debug!(%err, "ignoring toolchain path write failure");
        }

        fresh.extend(target.vars());
        tracing::debug!(entries = fresh.len(), "reloaded shadow environment");
        *entries = fresh;
    }

    /// Runs the toolchain path query when the target lacks the path variable.
    /// Runs without holding the shadow lock.
    fn query_toolchain_path(&self) -> Option<String> {
        if self
            .target
            .lock()
            .get_non_empty(&self.conventions.path_var)
            .is_some()
        {
            return None;
        }

        let argv = self.conventions.path_query();
        match self.runner.run(&argv) {
            Ok(output) => {
                let path = output.trim();
                (!path.is_empty()).then(|| path.to_owned())
            }
            Err(err) => {
                tracing::debug!(command = ?argv, %err, "toolchain path query failed");
                None
            }
        }
    }

    /// Merge override files into the target, in order, reloading after each.
    ///
    /// Stops at the first file that cannot be accessed or decoded. Files
    /// merged before the failure stay merged. With no files, the default
    /// override file is loaded instead.
    pub fn load<I, P>(&self, files: I) -> Result<LoadReport, Error>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let files: Vec<PathBuf> = files
            .into_iter()
            .map(|path| path.as_ref().to_path_buf())
            .collect();

        if files.is_empty() {
            let report = self.merge(&self.default_file)?;
            self.reload();
            return Ok(report);
        }

        let mut report = LoadReport::default();
        for path in &files {
            std::fs::metadata(path).map_err(|source| Error::FileAccess {
                path: path.clone(),
                source,
            })?;
            report.absorb(self.merge(path)?);
            self.reload();
        }
        Ok(report)
    }

    /// [`load`](Self::load) with no files: merge the default override file.
    pub fn load_default(&self) -> Result<LoadReport, Error> {
        self.load(std::iter::empty::<PathBuf>())
    }

    fn merge(&self, path: &Path) -> Result<LoadReport, Error> {
        let mut target = self.target.lock();
        self.loader.merge_file(path, &mut target)
    }

    /// An independent copy of every shadow variable.
    pub fn map(&self) -> HashMap<String, String> {
        self.entries.read().clone()
    }

    /// Every shadow variable as `name=value`, in no particular order.
    pub fn environ(&self) -> Vec<String> {
        self.entries
            .read()
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect()
    }

    /// Run `action` against a throwaway copy of the shadow.
    ///
    /// Changes made through this `ShadowEnv` while `action` runs are dropped
    /// afterwards, also when `action` panics. Writes that reach the target
    /// (`must_set`, `load`) are not undone.
    ///
    /// **Not safe for concurrent use.** The lock is held only while swapping
    /// the copy in and the original back, not while `action` runs: other
    /// threads see the temporary values meanwhile, and their writes are lost
    /// when the original is restored.
    pub fn temp<R>(&self, action: impl FnOnce() -> R) -> R {
        let original = {
            let mut entries = self.entries.write();
            let copy = entries.clone();
            std::mem::replace(&mut *entries, copy)
        };
        tracing::trace!("swapped in temporary shadow environment");

        let _restore = scopeguard::guard(original, |original| {
            *self.entries.write() = original;
            tracing::trace!("restored shadow environment");
        });
        action()
    }

    /// The toolchain package path, or an empty string.
    pub fn toolchain_path(&self) -> String {
        self.get(&self.conventions.path_var, "")
    }

    /// The toolchain binary name.
    pub fn toolchain_bin(&self) -> String {
        self.get(&self.conventions.bin_var, &self.conventions.default_bin)
    }

    pub fn conventions(&self) -> &Conventions {
        &self.conventions
    }

    /// Copy of the current target state when it is in-memory.
    pub fn target_snapshot(&self) -> Option<std::collections::BTreeMap<String, String>> {
        self.target.lock().as_memory().cloned()
    }
}

/// Builder-style configuration for [`ShadowEnv`].
pub struct ShadowEnvBuilder {
    target: TargetEnv,
    conventions: Conventions,
    harness: HarnessDetection,
    runner: Box<dyn CommandRunner>,
    loader: EnvLoader,
    default_file: PathBuf,
}

impl ShadowEnvBuilder {
    fn new(target: TargetEnv) -> Self {
        Self {
            target,
            conventions: Conventions::default(),
            harness: HarnessDetection::Auto,
            runner: Box::new(SystemRunner),
            loader: EnvLoader::default(),
            default_file: PathBuf::from(DEFAULT_FILE),
        }
    }

    pub fn conventions(mut self, conventions: Conventions) -> Self {
        self.conventions = conventions;
        self
    }

    pub fn harness(mut self, harness: HarnessDetection) -> Self {
        self.harness = harness;
        self
    }

    /// Runner used for the toolchain path query.
    pub fn runner(mut self, runner: impl CommandRunner + 'static) -> Self {
        self.runner = Box::new(runner);
        self
    }

    pub fn loader(mut self, loader: EnvLoader) -> Self {
        self.loader = loader;
        self
    }

    /// File merged by [`ShadowEnv::load_default`]. Defaults to `.env`.
    pub fn default_file(mut self, path: impl AsRef<Path>) -> Self {
        self.default_file = path.as_ref().to_path_buf();
        self
    }

    /// Build the shadow and seed it with [`ShadowEnv::reload`].
    pub fn build(self) -> ShadowEnv {
        let shadow = ShadowEnv {
            entries: RwLock::new(HashMap::new()),
            target: Mutex::new(self.target),
            conventions: self.conventions,
            harness: self.harness,
            runner: self.runner,
            loader: self.loader,
            default_file: self.default_file,
        };
        shadow.reload();
        shadow
    }
}

static GLOBAL: OnceLock<ShadowEnv> = OnceLock::new();

/// The process-wide shadow over the real process environment.
///
/// The first call builds it, merges `.env` from the current directory when
/// present, and seeds it. Later calls return the same instance.
///
/// # Safety
///
/// Same contract as [`TargetEnv::process`]: no other thread may read or
/// write the process environment while this call, or any mutating call on
/// the returned shadow, runs.
pub unsafe fn init_global() -> &'static ShadowEnv {
    GLOBAL.get_or_init(|| {
        // SAFETY: forwarded to the caller of `init_global`.
        let target = unsafe { TargetEnv::process() };
        let shadow = ShadowEnv::builder(target).build();
        if let Err(err) = shadow.load_default() {
            tracing::debug!(%err, "no default override file loaded");
        }
        shadow
    })
}

/// The process-wide shadow, if [`init_global`] has run.
pub fn global() -> Option<&'static ShadowEnv> {
    GLOBAL.get()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::io;

    use super::*;

    fn no_toolchain(_: &[String]) -> io::Result<String> {
        Err(io::Error::new(io::ErrorKind::NotFound, "no toolchain"))
    }

    fn shadow_over(pairs: &[(&str, &str)]) -> ShadowEnv {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        ShadowEnv::builder(TargetEnv::from_memory(map))
            .harness(HarnessDetection::Assume(false))
            .runner(no_toolchain)
            .build()
    }

    #[test]
    fn build_seeds_from_target() {
        let shadow = shadow_over(&[("HOME", "/home/me")]);
        assert_eq!(shadow.get("HOME", "x"), "/home/me");
        assert_eq!(shadow.map().len(), 1);
    }

    #[test]
    fn must_set_holds_shadow_unchanged_on_rejection() {
        let shadow = shadow_over(&[]);
        let err = shadow.must_set("A=B", "1").expect_err("write should fail");
        assert!(matches!(err, Error::EnvironmentWrite { .. }));
        assert!(shadow.map().is_empty());
        assert_eq!(shadow.target_snapshot(), Some(BTreeMap::new()));
    }

    #[test]
    fn debug_output_hides_values() {
        let shadow = shadow_over(&[("SECRET", "hunter2")]);
        let debug = format!("{shadow:?}");
        assert!(debug.contains("ShadowEnv"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn nested_temp_restores_each_level() {
        let shadow = shadow_over(&[]);
        shadow.set("X", "1");
        shadow.temp(|| {
            shadow.set("X", "2");
            shadow.temp(|| shadow.set("X", "3"));
            assert_eq!(shadow.get("X", ""), "2");
        });
        assert_eq!(shadow.get("X", ""), "1");
    }
}
