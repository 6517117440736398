//! A process-local shadow of environment variables.
//!
//! [`ShadowEnv`] keeps its own copy of the environment behind a single
//! reader/writer lock. Reads and [`ShadowEnv::set`] never touch the real
//! environment; [`ShadowEnv::must_set`] and [`ShadowEnv::load`] write through
//! to the [`TargetEnv`] the shadow was built over and reseed from it.
//!
//! Build a shadow over an in-memory [`TargetEnv`] to keep the process
//! environment untouched, or use [`init_global`], which is `unsafe` for the
//! same reason [`TargetEnv::process`] is: callers must guarantee no
//! concurrent process-environment access.
//!
//! ```
//! use envshade::{HarnessDetection, ShadowEnv, TargetEnv};
//!
//! let shadow = ShadowEnv::builder(TargetEnv::memory())
//!     .harness(HarnessDetection::Assume(false))
//!     .build();
//! shadow.set("PORT", "8080");
//!
//! shadow.temp(|| {
//!     shadow.set("PORT", "0");
//!     assert_eq!(shadow.get("PORT", "80"), "0");
//! });
//! assert_eq!(shadow.get("PORT", "80"), "8080");
//! ```

mod env;
mod error;
mod loader;
mod model;
mod parser;
mod shadow;
mod toolchain;

pub use env::TargetEnv;
pub use error::{DecodeError, Error, ParseError, ParseErrorKind, WriteRejection};
pub use loader::EnvLoader;
pub use model::{Conventions, Entry, KeyParsingMode, LoadReport, SubstitutionMode};
pub use parser::{parse_bytes, parse_bytes_with_mode, parse_str, parse_str_with_mode};
pub use shadow::{ShadowEnv, ShadowEnvBuilder, global, init_global};
pub use toolchain::{CommandRunner, HarnessDetection, SystemRunner};
