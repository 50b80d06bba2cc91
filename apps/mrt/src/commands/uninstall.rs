//! Uninstall command for the mrt CLI.
//!
//! Removes installed MATLAB Runtime releases. If no release is given, the
//! whole install prefix is removed.
//!
//! ## Usage
//!
//! ```bash
//! mrt uninstall                 # Remove every install under the prefix
//! mrt uninstall R2022b          # Remove one release
//! mrt uninstall R2022b R2023a -y
//! ```
//!
//! When several releases are given, each one is attempted and failures are
//! reported at the end.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use matlab_runtime::VersionRequest;

/// Arguments for the uninstall command.
#[derive(Args)]
pub struct UninstallArgs {
    /// Releases to remove (e.g., "R2022b", "9.13" or "all").
    ///
    /// If omitted, removes every install under the prefix.
    #[clap(value_name = "VERSION")]
    pub versions: Vec<String>,

    /// Install prefix.
    ///
    /// Defaults to `MATLAB_RUNTIME_PATH`, then to the platform's standard
    /// location.
    #[clap(long)]
    pub prefix: Option<PathBuf>,

    /// Answer "yes" to the removal confirmation.
    #[clap(long, short = 'y')]
    pub yes: bool,
}

/// Executes the uninstall command.
///
/// # Errors
///
/// Returns an error if:
/// - Platform detection fails
/// - A single requested release is not installed, or its removal fails
/// - The removal confirmation is declined
/// - Any of several requested releases could not be removed
pub async fn execute(args: &UninstallArgs) -> Result<()> {
    let mut installer = super::build_installer(args.prefix.clone(), args.yes)?;
    let requests = super::version_requests(&args.versions, VersionRequest::All);

    if let [request] = requests.as_slice() {
        installer.uninstall(request).await?;
        return Ok(());
    }

    let total = requests.len();
    let failures = installer.uninstall_all(requests).await;
    if !failures.is_empty() {
        let names: Vec<String> = failures.iter().map(|(req, _)| req.to_string()).collect();
        anyhow::bail!(
            "{} of {total} runtime(s) could not be uninstalled: {}",
            failures.len(),
            names.join(", ")
        );
    }
    Ok(())
}
