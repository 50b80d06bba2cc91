//! List command for the mrt CLI.
//!
//! Displays the runtime releases installed under the prefix and marks the
//! one picked by default when the SDK is initialized.
//!
//! ## Usage
//!
//! ```bash
//! mrt list
//! mrt list --prefix /opt/mcr --json
//! ```
//!
//! ## Output Format
//!
//! ```text
//! Installed runtimes in /opt/mcr:
//!
//!   R2022b    (9.13)
//! * R2023b    (23.2, default)
//! ```
//!
//! Only directories that contain the license agreement written by a
//! finished install are listed.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use matlab_runtime::{InstallPaths, Platform, Release};
use serde::Serialize;

/// Arguments for the list command.
#[derive(Args)]
pub struct ListArgs {
    /// Install prefix to inspect.
    #[clap(long)]
    pub prefix: Option<PathBuf>,

    /// Output as JSON for machine consumption.
    #[clap(long)]
    pub json: bool,
}

/// One installed release in JSON output.
#[derive(Serialize)]
struct InstalledRelease {
    release: String,
    version: Option<String>,
    path: PathBuf,
    default: bool,
}

/// Executes the list command.
///
/// # Errors
///
/// Returns an error if the platform is unsupported or the prefix cannot be
/// read.
pub fn execute(args: &ListArgs) -> Result<()> {
    let platform = Platform::detect()?;
    let paths = InstallPaths::resolve(args.prefix.clone(), platform);
    let releases = paths.installed_releases()?;

    if args.json {
        output_json(&paths, &releases)
    } else {
        output_text(&paths, &releases);
        Ok(())
    }
}

fn output_json(paths: &InstallPaths, releases: &[Release]) -> Result<()> {
    let newest = releases.last();
    let entries: Vec<InstalledRelease> = releases
        .iter()
        .map(|release| InstalledRelease {
            release: release.to_string(),
            version: release.numeric_version(),
            path: paths.release_dir(release),
            default: Some(release) == newest,
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

fn output_text(paths: &InstallPaths, releases: &[Release]) {
    if releases.is_empty() {
        println!("No runtimes installed in {}.", paths.prefix().display());
        println!();
        println!("Run 'mrt install' to install the latest runtime.");
        return;
    }

    println!("Installed runtimes in {}:", paths.prefix().display());
    println!();

    let newest = releases.last();
    for release in releases {
        let is_default = Some(release) == newest;
        let mut info_parts = Vec::new();
        if let Some(version) = release.numeric_version() {
            info_parts.push(version);
        }
        if is_default {
            info_parts.push("default".to_string());
        }

        let marker = if is_default { "*" } else { " " };
        if info_parts.is_empty() {
            println!("{marker} {release}");
        } else {
            println!("{marker} {release}    ({})", info_parts.join(", "));
        }
    }
}
