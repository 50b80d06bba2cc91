#![warn(clippy::pedantic)]

//! # MATLAB Runtime manager (mrt)
//!
//! The `mrt` command installs, lists and removes MATLAB Runtime releases
//! under a single install prefix, and checks that an install is usable for
//! packages built with MATLAB Compiler SDK.
//!
//! ## Subcommands
//!
//! - `install` - Download and install one or more runtime releases
//! - `uninstall` - Remove installed runtime releases
//! - `list` - List installed runtime releases
//! - `versions` - List releases known to the built-in catalog
//! - `doctor` - Check installation health
//!
//! ## Examples
//!
//! Install the newest available release:
//! ```bash
//! mrt install
//! ```
//!
//! Install two releases without prompting:
//! ```bash
//! mrt install R2022b 23.2 --yes
//! ```
//!
//! Remove everything under the prefix:
//! ```bash
//! mrt uninstall all
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{doctor, install, list, uninstall, versions};
use tracing_subscriber::EnvFilter;

/// Exit code used when the user answers "no" to a required confirmation.
const DECLINED_EXIT_CODE: i32 = 2;

/// MATLAB Runtime manager.
///
/// The `mrt` command manages MATLAB Runtime installs: it resolves releases
/// against the MathWorks download server, runs the vendor installer
/// unattended and removes installs again.
#[derive(Parser)]
#[command(
    name = "mrt",
    author,
    version,
    about = "Install and manage the MATLAB Runtime",
    long_about = "The 'mrt' command installs and removes MATLAB Runtime releases. Releases are \
    named as 'R2022b' or by runtime version such as '9.13' or '23.2'.",
    after_help = "\
VERSION ARGUMENTS:
    latest                  Newest release on the download server (install default)
    latest_installed        Newest release under the install prefix
    all                     Every install under the prefix (uninstall default)

ENVIRONMENT VARIABLES:
    MATLAB_RUNTIME_PATH          Install prefix (overridden by --prefix)
    MATLAB_RUNTIME_DIST_SERVER   Download server base URL
                                 (default: https://ssd.mathworks.com/supportfiles/downloads)
    RUST_LOG                     Log filter (default: warn)"
)]
pub struct Cli {
    /// Enable debug logging for the runtime library.
    ///
    /// Ignored when `RUST_LOG` is set.
    #[clap(long, short = 'v', global = true, action = clap::ArgAction::SetTrue)]
    pub verbose: bool,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands for the mrt CLI.
#[derive(Subcommand)]
pub enum Commands {
    /// Install MATLAB Runtime releases.
    ///
    /// Downloads the vendor installer for each requested release, unpacks
    /// it and runs it in silent mode. If no release is given, installs the
    /// newest release available on the download server.
    Install(install::InstallArgs),

    /// Uninstall MATLAB Runtime releases.
    ///
    /// Removes the requested release directories. If no release is given,
    /// removes the whole install prefix.
    Uninstall(uninstall::UninstallArgs),

    /// List installed runtime releases.
    ///
    /// Displays every release under the install prefix that has a complete
    /// install and marks the one selected by default at SDK initialization.
    List(list::ListArgs),

    /// List releases known to the catalog.
    ///
    /// Shows the releases the built-in catalog has installer URLs for.
    /// Newer releases are discovered at install time by probing the server.
    Versions(versions::VersionsArgs),

    /// Check installation health.
    ///
    /// Verifies the platform, the install prefix and the SDK directories
    /// of the newest install, and reports issues with remediation hints.
    Doctor(doctor::DoctorArgs),
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(e) = run(cli).await {
        let exit_code = handle_error(&e);
        std::process::exit(exit_code);
    }
}

/// Installs the stderr log subscriber.
///
/// `RUST_LOG` takes precedence; otherwise only warnings are shown unless
/// `--verbose` was given.
fn init_tracing(verbose: bool) {
    let fallback = if verbose {
        "warn,matlab_runtime=debug,mrt=debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Handles an error and returns the appropriate exit code.
///
/// A declined confirmation is not a failure of the tool, so it is reported
/// as an abort with its own exit code. All other errors print their chain
/// and return exit code 1.
fn handle_error(e: &anyhow::Error) -> i32 {
    if let Some(matlab_runtime::Error::UserDeclined { question }) =
        e.downcast_ref::<matlab_runtime::Error>()
    {
        eprintln!("Aborted: {}", question.trim_end());
        return DECLINED_EXIT_CODE;
    }
    eprintln!("Error: {e:?}");
    1
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Commands::Install(args)) => install::execute(&args).await,
        Some(Commands::Uninstall(args)) => uninstall::execute(&args).await,
        Some(Commands::List(args)) => list::execute(&args),
        Some(Commands::Versions(args)) => versions::execute(&args),
        Some(Commands::Doctor(args)) => doctor::execute(&args),
        None => {
            println!("mrt: MATLAB Runtime manager");
            println!();
            println!("Run 'mrt --help' for usage information.");
            println!("Run 'mrt install --help' for install options.");
            Ok(())
        }
    }
}
