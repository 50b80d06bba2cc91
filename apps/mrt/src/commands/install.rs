//! Install command for the mrt CLI.
//!
//! Downloads and runs the vendor installer for one or more MATLAB Runtime
//! releases. If no release is given, installs the newest release available
//! on the download server.
//!
//! ## Usage
//!
//! ```bash
//! mrt install                   # Install the newest release
//! mrt install R2022b            # Install a named release
//! mrt install 9.13 23.2 --yes   # Install by runtime version, no prompts
//! mrt install --prefix /opt/mcr # Install under a custom prefix
//! ```
//!
//! Each release is installed to `<prefix>/<release>`. Every download,
//! unpack and license step asks for confirmation unless `--yes` is given.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use matlab_runtime::VersionRequest;

/// Arguments for the install command.
#[derive(Args)]
pub struct InstallArgs {
    /// Releases to install (e.g., "R2022b", "R2023a", "9.13" or "latest").
    ///
    /// If omitted, installs the newest available release.
    #[clap(value_name = "VERSION")]
    pub versions: Vec<String>,

    /// Install prefix.
    ///
    /// Defaults to `MATLAB_RUNTIME_PATH`, then to the platform's standard
    /// location.
    #[clap(long)]
    pub prefix: Option<PathBuf>,

    /// Answer "yes" to every confirmation, including the license agreement.
    #[clap(long, short = 'y')]
    pub yes: bool,
}

/// Executes the install command.
///
/// # Process
///
/// 1. Detect the current platform and resolve the install prefix
/// 2. Resolve each requested release to an installer URL
/// 3. Download, unpack and run the installer for each release
/// 4. Verify the license marker of each install
///
/// # Errors
///
/// Returns an error if:
/// - Platform detection fails
/// - A version cannot be parsed or is not available
/// - A download or the installer fails
/// - A required confirmation is declined
pub async fn execute(args: &InstallArgs) -> Result<()> {
    let mut installer = super::build_installer(args.prefix.clone(), args.yes)?;
    let requests = super::version_requests(&args.versions, VersionRequest::Latest);

    let installed: Vec<PathBuf> = installer.install_all(requests).await?;
    tracing::debug!(count = installed.len(), "install finished");
    Ok(())
}
