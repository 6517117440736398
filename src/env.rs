use std::collections::BTreeMap;

use crate::error::{Error, WriteRejection};

/// The environment a shadow is seeded from and writes through to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetEnv {
    kind: TargetEnvKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TargetEnvKind {
    /// The current process environment.
    ///
    /// Writes go through [`std::env::set_var`], which mutates global process
    /// state and is not thread-safe for concurrent environment access.
    Process,
    /// An in-memory map standing in for the process environment.
    Memory(BTreeMap<String, String>),
}

impl Default for TargetEnv {
    fn default() -> Self {
        Self::memory()
    }
}

impl TargetEnv {
    /// Create a process-environment target.
    ///
    /// # Safety
    ///
    /// The caller must ensure no other threads concurrently read or write the
    /// process environment for the duration of operations that may mutate this
    /// target: [`ShadowEnv::must_set`](crate::ShadowEnv::must_set),
    /// [`ShadowEnv::load`](crate::ShadowEnv::load) and
    /// [`ShadowEnv::reload`](crate::ShadowEnv::reload).
    pub unsafe fn process() -> Self {
        Self {
            kind: TargetEnvKind::Process,
        }
    }

    /// Create an empty in-memory target.
    pub fn memory() -> Self {
        Self::from_memory(BTreeMap::new())
    }

    /// Create an in-memory target from an existing map.
    pub fn from_memory(map: BTreeMap<String, String>) -> Self {
        Self {
            kind: TargetEnvKind::Memory(map),
        }
    }

    /// Create an in-memory target holding a copy of the current process
    /// environment. Non-UTF-8 names and values are converted lossily.
    pub fn snapshot() -> Self {
        Self::from_memory(process_vars())
    }

    pub fn is_process(&self) -> bool {
        matches!(self.kind, TargetEnvKind::Process)
    }

    pub fn as_memory(&self) -> Option<&BTreeMap<String, String>> {
        match &self.kind {
            TargetEnvKind::Memory(map) => Some(map),
            TargetEnvKind::Process => None,
        }
    }

    pub(crate) fn contains_key(&self, key: &str) -> bool {
        match &self.kind {
            TargetEnvKind::Process => std::env::var_os(key).is_some(),
            TargetEnvKind::Memory(map) => map.contains_key(key),
        }
    }

    pub(crate) fn get_var(&self, key: &str) -> Option<String> {
        match &self.kind {
            TargetEnvKind::Process => {
                std::env::var_os(key).map(|value| value.to_string_lossy().into_owned())
            }
            TargetEnvKind::Memory(map) => map.get(key).cloned(),
        }
    }

    /// Like [`get_var`](Self::get_var), treating an empty value as unset.
    pub(crate) fn get_non_empty(&self, key: &str) -> Option<String> {
        self.get_var(key).filter(|value| !value.is_empty())
    }

    /// Writes `key=value`, rejecting input the OS would refuse.
    pub(crate) fn set_var(&mut self, key: &str, value: &str) -> Result<(), Error> {
        validate(key, value).map_err(|reason| Error::EnvironmentWrite {
            name: key.to_owned(),
            reason,
        })?;

        match &mut self.kind {
            TargetEnvKind::Process => unsafe { std::env::set_var(key, value) },
            TargetEnvKind::Memory(map) => {
                map.insert(key.to_owned(), value.to_owned());
            }
        }
        Ok(())
    }

    pub(crate) fn vars(&self) -> Vec<(String, String)> {
        match &self.kind {
            TargetEnvKind::Process => process_vars().into_iter().collect(),
            TargetEnvKind::Memory(map) => map
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        }
    }
}

fn process_vars() -> BTreeMap<String, String> {
    std::env::vars_os()
        .map(|(key, value)| {
            (
                key.to_string_lossy().into_owned(),
                value.to_string_lossy().into_owned(),
            )
        })
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

fn validate(key: &str, value: &str) -> Result<(), WriteRejection> {
    if key.is_empty() {
        return Err(WriteRejection::EmptyName);
    }
    if key.contains(['=', '\0']) {
        return Err(WriteRejection::InvalidName);
    }
    if value.contains('\0') {
        return Err(WriteRejection::InvalidValue);
    }
    Ok(())
}
