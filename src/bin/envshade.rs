use std::ffi::OsString;
use std::io;
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{self, Command};

use clap::{Args, Parser, Subcommand};
use envshade::{
    EnvLoader, Error, HarnessDetection, KeyParsingMode, ShadowEnv, SubstitutionMode, TargetEnv,
};
use tracing_subscriber::EnvFilter;

/// Inspect and run commands under a shadow of the environment extended with
/// dotenv files.
#[derive(Debug, Parser)]
#[command(name = "envshade", version, about)]
struct Cli {
    /// Print loader diagnostics to stderr.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all diagnostics.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Load dotenv files and execute a command with the resulting environment.
    Run {
        #[command(flatten)]
        load: LoadArgs,

        /// Command to run, followed by its arguments.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<OsString>,
    },
    /// Print every variable as `NAME=VALUE`, sorted by name.
    Print {
        #[command(flatten)]
        load: LoadArgs,
    },
    /// Print the value of one variable.
    Get {
        #[command(flatten)]
        load: LoadArgs,

        name: String,

        /// Printed when the variable is unset; without it, unset is an error.
        #[arg(short, long)]
        default: Option<String>,
    },
}

#[derive(Debug, Clone, Args)]
struct LoadArgs {
    /// Dotenv file path(s). Repeat or pass comma-separated paths. Defaults to .env.
    #[arg(short, long = "file", value_delimiter = ',')]
    files: Vec<PathBuf>,

    /// Keep variables that are already set instead of overriding them.
    #[arg(short, long)]
    keep_existing: bool,

    /// Expand `$VAR` and `${VAR}` placeholders in values.
    #[arg(long)]
    expand: bool,

    /// Accept permissive key syntax.
    #[arg(long)]
    permissive_keys: bool,
}

impl LoadArgs {
    fn loader(&self) -> EnvLoader {
        EnvLoader::new()
            .override_existing(!self.keep_existing)
            .substitution_mode(if self.expand {
                SubstitutionMode::Expand
            } else {
                SubstitutionMode::Disabled
            })
            .key_parsing_mode(if self.permissive_keys {
                KeyParsingMode::Permissive
            } else {
                KeyParsingMode::Strict
            })
    }

    /// A shadow over a snapshot of this process's environment with the
    /// selected files merged in.
    fn shadow(&self) -> Result<ShadowEnv, Error> {
        let shadow = ShadowEnv::builder(TargetEnv::snapshot())
            .harness(HarnessDetection::Assume(false))
            .runner(no_toolchain)
            .loader(self.loader())
            .build();
        shadow.load(&self.files)?;
        Ok(shadow)
    }
}

/// The CLI reports the environment it was given and never asks a toolchain
/// to fill gaps in it.
fn no_toolchain(_: &[String]) -> io::Result<String> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "toolchain queries are disabled",
    ))
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);
    process::exit(run(cli.command));
}

fn init_logging(cli: &Cli) {
    let filter = if cli.quiet {
        EnvFilter::new("off")
    } else if cli.verbose {
        EnvFilter::new("envshade=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn run(command: Cmd) -> i32 {
    let result = match command {
        Cmd::Run { load, command } => execute(&load, &command),
        Cmd::Print { load } => print(&load),
        Cmd::Get {
            load,
            name,
            default,
        } => get(&load, &name, default.as_deref()),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("envshade: {err}");
            1
        }
    }
}

fn execute(load: &LoadArgs, argv: &[OsString]) -> Result<i32, String> {
    let shadow = load.shadow().map_err(|err| err.to_string())?;
    let Some((program, args)) = argv.split_first() else {
        return Err("missing command after `run`".to_owned());
    };

    let mut command = Command::new(program);
    command.args(args).env_clear().envs(shadow.map());
    execute_command(command, program)
}

#[cfg(unix)]
fn execute_command(mut command: Command, program: &OsString) -> Result<i32, String> {
    let err = command.exec();
    Err(format!(
        "failed to execute `{}`: {err}",
        program.to_string_lossy()
    ))
}

#[cfg(not(unix))]
fn execute_command(mut command: Command, program: &OsString) -> Result<i32, String> {
    let status = command
        .status()
        .map_err(|err| format!("failed to execute `{}`: {err}", program.to_string_lossy()))?;
    Ok(status.code().unwrap_or(1))
}

fn print(load: &LoadArgs) -> Result<i32, String> {
    let shadow = load.shadow().map_err(|err| err.to_string())?;
    let mut lines = shadow.environ();
    lines.sort();
    for line in lines {
        println!("{line}");
    }
    Ok(0)
}

fn get(load: &LoadArgs, name: &str, default: Option<&str>) -> Result<i32, String> {
    let shadow = load.shadow().map_err(|err| err.to_string())?;
    let value = match default {
        Some(fallback) => shadow.get(name, fallback),
        None => shadow.must_get(name).map_err(|err| err.to_string())?,
    };
    println!("{value}");
    Ok(0)
}
