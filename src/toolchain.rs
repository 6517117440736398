//! Ambient capabilities consulted while reseeding: running the toolchain's
//! path query and noticing a test harness.

use std::io;
use std::path::Path;
use std::process::Command;

/// Runs a command line and returns what it printed on stdout.
pub trait CommandRunner: Send + Sync {
    fn run(&self, argv: &[String]) -> io::Result<String>;
}

impl<F> CommandRunner for F
where
    F: Fn(&[String]) -> io::Result<String> + Send + Sync,
{
    fn run(&self, argv: &[String]) -> io::Result<String> {
        self(argv)
    }
}

/// Spawns a real subprocess and waits for it, with no timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, argv: &[String]) -> io::Result<String> {
        let Some((program, args)) = argv.split_first() else {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty command line"));
        };

        let output = Command::new(program).args(args).output()?;
        if !output.status.success() {
            return Err(io::Error::other(format!(
                "`{program}` exited with {}",
                output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// How a shadow environment decides whether it runs under a test harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HarnessDetection {
    /// Inspect the running process.
    #[default]
    Auto,
    /// Skip detection and use the given answer.
    Assume(bool),
}

impl HarnessDetection {
    pub fn detect(self) -> bool {
        match self {
            Self::Auto => running_under_test_harness(),
            Self::Assume(answer) => answer,
        }
    }
}

/// Heuristic: cargo-nextest and libtest export marker variables, and
/// `cargo test` places its test binaries in a `deps` directory.
fn running_under_test_harness() -> bool {
    if ["NEXTEST_RUN_ID", "RUST_TEST_THREADS"]
        .iter()
        .any(|name| std::env::var_os(name).is_some())
    {
        return true;
    }

    std::env::current_exe()
        .ok()
        .as_deref()
        .and_then(Path::parent)
        .and_then(Path::file_name)
        .is_some_and(|dir| dir == "deps")
}
