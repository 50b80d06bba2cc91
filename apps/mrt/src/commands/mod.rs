//! Command modules for the mrt CLI.
//!
//! ## Install Management Commands
//!
//! - [`install`] - Install runtime releases
//! - [`uninstall`] - Remove runtime releases
//!
//! ## Inspection Commands
//!
//! - [`list`] - List installed runtime releases
//! - [`versions`] - List releases known to the catalog
//! - [`doctor`] - Check installation health

pub mod doctor;
pub mod install;
pub mod list;
pub mod uninstall;
pub mod versions;

use std::path::PathBuf;

use anyhow::Result;
use matlab_runtime::{
    Catalog, ConfirmationGate, HttpFetcher, InstallPaths, Installer, InstallerResolver, Platform,
    VersionRequest,
};

/// Builds an installer for the current platform wired to stdin/stdout and
/// the MathWorks download server.
///
/// # Errors
///
/// Returns an error if the platform is unsupported or the HTTP client
/// cannot be created.
pub(crate) fn build_installer(
    prefix: Option<PathBuf>,
    yes: bool,
) -> Result<Installer<HttpFetcher>> {
    let platform = Platform::detect()?;
    Ok(Installer::new(
        platform,
        InstallPaths::resolve(prefix, platform),
        ConfirmationGate::stdio(yes),
        InstallerResolver::new(Catalog::from_env()),
        HttpFetcher::new()?,
    ))
}

/// Parses positional version arguments, substituting `default` when none
/// were given.
pub(crate) fn version_requests(args: &[String], default: VersionRequest) -> Vec<VersionRequest> {
    if args.is_empty() {
        vec![default]
    } else {
        args.iter().map(|arg| VersionRequest::parse(arg)).collect()
    }
}
