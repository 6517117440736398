use std::path::PathBuf;

/// A parsed `KEY=VALUE` entry from a `.env` file or input buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: String,
    pub source: Option<PathBuf>,
    pub line: u32,
}

/// Summary of a [`ShadowEnv::load`](crate::ShadowEnv::load) call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadReport {
    /// Entries written into the environment target.
    pub loaded: usize,
    /// Entries left alone because the target already had the key.
    pub skipped_existing: usize,
    pub files_read: usize,
}

impl LoadReport {
    pub(crate) fn absorb(&mut self, other: LoadReport) {
        self.loaded += other.loaded;
        self.skipped_existing += other.skipped_existing;
        self.files_read += other.files_read;
    }
}

/// Variable expansion behavior for loader values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubstitutionMode {
    /// Keep values as parsed with no expansion.
    #[default]
    Disabled,
    /// Expand `$VAR` and `${VAR}` placeholders.
    Expand,
}

/// Key validation behavior for parser and loader entry parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyParsingMode {
    /// `[A-Za-z0-9_.-]+`
    #[default]
    Strict,
    /// Printable ASCII except `=`.
    Permissive,
}

/// Variable names consulted while reseeding a shadow environment.
///
/// The defaults match the Go toolchain, whose `go env GOPATH` query is the
/// path lookup performed when the path variable is unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conventions {
    /// Variable that names the running mode.
    pub mode_var: String,
    /// Mode value recorded when running under a test harness.
    pub test_mode: String,
    /// Variable holding the toolchain's package path.
    pub path_var: String,
    /// Variable naming the toolchain binary.
    pub bin_var: String,
    /// Toolchain binary used when `bin_var` is unset.
    pub default_bin: String,
}

impl Default for Conventions {
    fn default() -> Self {
        Self {
            mode_var: "GO_ENV".to_owned(),
            test_mode: "test".to_owned(),
            path_var: "GOPATH".to_owned(),
            bin_var: "GO_BIN".to_owned(),
            default_bin: "go".to_owned(),
        }
    }
}

impl Conventions {
    /// Command line that prints the toolchain's default package path.
    pub fn path_query(&self) -> Vec<String> {
        vec![
            self.default_bin.clone(),
            "env".to_owned(),
            self.path_var.clone(),
        ]
    }
}
