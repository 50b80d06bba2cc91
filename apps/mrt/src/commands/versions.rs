//! Versions command for the mrt CLI.
//!
//! Lists the releases the built-in catalog has installer URLs for. The
//! catalog is offline; releases published after it are found at install
//! time by probing the download server.
//!
//! ## Usage
//!
//! ```bash
//! mrt versions                      # Releases for the current platform
//! mrt versions --platform maca64    # Releases for another platform
//! mrt versions --json               # Output in JSON format
//! ```
//!
//! ## Output Format
//!
//! ```text
//! Known MATLAB Runtime releases for glnxa64:
//!
//!   R2024b    (24.2)
//!   R2024a    (24.1)
//!   R2022b    (9.13)
//! ```

use anyhow::Result;
use clap::Args;
use matlab_runtime::{Catalog, Platform};
use serde::Serialize;

/// Arguments for the versions command.
#[derive(Args)]
pub struct VersionsArgs {
    /// Platform tag to list (win64, glnxa64, maci64, maca64, ...).
    ///
    /// Defaults to the current platform.
    #[clap(long, short = 'p')]
    pub platform: Option<Platform>,

    /// Show versions in JSON format.
    #[clap(long, short = 'j')]
    pub json: bool,
}

/// Release information for JSON output.
#[derive(Debug, Clone, Serialize)]
struct VersionInfo {
    release: String,
    version: Option<String>,
    url: String,
}

/// Executes the versions command.
///
/// # Errors
///
/// Returns an error if no platform was given and the current one is not
/// supported.
pub fn execute(args: &VersionsArgs) -> Result<()> {
    let platform = match args.platform {
        Some(platform) => platform,
        None => Platform::detect()?,
    };
    let catalog = Catalog::from_env();
    let infos = collect(&catalog, platform);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
    } else {
        output_text(&infos, platform);
    }
    Ok(())
}

/// Collects catalog entries for a platform, newest first.
fn collect(catalog: &Catalog, platform: Platform) -> Vec<VersionInfo> {
    let mut infos: Vec<VersionInfo> = catalog
        .releases(platform)
        .map(|(release, url)| VersionInfo {
            release: release.to_string(),
            version: release.numeric_version(),
            url: url.to_string(),
        })
        .collect();
    infos.reverse();
    infos
}

fn output_text(infos: &[VersionInfo], platform: Platform) {
    if infos.is_empty() {
        println!("No catalog releases for {platform}.");
        println!();
        println!("Run 'mrt install <release>' to probe the download server directly.");
        return;
    }

    println!("Known MATLAB Runtime releases for {platform}:");
    println!();
    for info in infos {
        match &info.version {
            Some(version) => println!("  {}    ({version})", info.release),
            None => println!("  {}", info.release),
        }
    }
}
