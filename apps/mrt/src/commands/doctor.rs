//! Doctor command for the mrt CLI.
//!
//! Verifies that a MATLAB Runtime install is usable and reports any issues
//! with suggested remediation steps.
//!
//! ## Usage
//!
//! ```bash
//! mrt doctor
//! mrt doctor --prefix /opt/mcr
//! ```
//!
//! ## Checks Performed
//!
//! - Platform detection
//! - Install prefix existence
//! - Installed releases
//! - SDK directories of the newest install
//! - Runtime C API library presence
//! - `VersionInfo.xml` agreement with the release directory name

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use matlab_runtime::native::{RUNTIME_LIBRARY, VERSION_INFO_FILE, major_minor, parse_version_info};
use matlab_runtime::{InstallPaths, Platform, Release, SearchPath};

/// Arguments for the doctor command.
#[derive(Args)]
pub struct DoctorArgs {
    /// Install prefix to inspect.
    #[clap(long)]
    pub prefix: Option<PathBuf>,
}

/// Status of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}

/// Result of a single check.
#[derive(Debug, Clone)]
struct Check {
    name: &'static str,
    status: CheckStatus,
    message: String,
}

impl Check {
    fn ok(name: &'static str, message: impl Into<String>) -> Self {
        Self {
            name,
            status: CheckStatus::Ok,
            message: message.into(),
        }
    }

    fn warning(name: &'static str, message: impl Into<String>) -> Self {
        Self {
            name,
            status: CheckStatus::Warning,
            message: message.into(),
        }
    }

    fn error(name: &'static str, message: impl Into<String>) -> Self {
        Self {
            name,
            status: CheckStatus::Error,
            message: message.into(),
        }
    }

    fn prefix(&self) -> &'static str {
        match self.status {
            CheckStatus::Ok => "[OK]",
            CheckStatus::Warning => "[WARN]",
            CheckStatus::Error => "[FAIL]",
        }
    }
}

/// Executes the doctor command.
///
/// Runs all health checks and displays the results.
///
/// # Errors
///
/// Never fails because of a failing check; checks that cannot run are
/// reported as `[FAIL]`.
#[allow(clippy::unnecessary_wraps)]
pub fn execute(args: &DoctorArgs) -> Result<()> {
    println!("Checking MATLAB Runtime installation...");
    println!();

    let checks = run_all_checks(args.prefix.clone());

    let mut has_errors = false;
    let mut has_warnings = false;
    for check in &checks {
        println!("  {} {}: {}", check.prefix(), check.name, check.message);
        match check.status {
            CheckStatus::Ok => {}
            CheckStatus::Warning => has_warnings = true,
            CheckStatus::Error => has_errors = true,
        }
    }

    println!();
    if has_errors {
        println!("Some checks failed. Run 'mrt install' to install the runtime.");
    } else if has_warnings {
        println!("Some warnings were found. The runtime may work but could have issues.");
    } else {
        println!("All checks passed. The runtime is ready to use.");
    }
    Ok(())
}

fn run_all_checks(prefix: Option<PathBuf>) -> Vec<Check> {
    let platform = match Platform::detect() {
        Ok(platform) => platform,
        Err(e) => return vec![Check::error("Platform", format!("Detection failed: {e}"))],
    };
    let mut checks = vec![Check::ok("Platform", format!("Detected {platform}"))];

    let paths = InstallPaths::resolve(prefix, platform);
    checks.push(check_prefix(&paths));

    let releases = match paths.installed_releases() {
        Ok(releases) => releases,
        Err(e) => {
            checks.push(Check::error("Installed releases", e.to_string()));
            return checks;
        }
    };
    let Some(newest) = releases.last() else {
        checks.push(Check::error(
            "Installed releases",
            "No complete install found under the prefix",
        ));
        return checks;
    };
    let names: Vec<String> = releases.iter().map(ToString::to_string).collect();
    checks.push(Check::ok("Installed releases", names.join(", ")));

    checks.push(check_sdk_dirs(&paths, newest, platform));
    checks.push(check_runtime_library(&paths, newest, platform));
    checks.push(check_version_info(&paths, newest));
    checks
}

fn check_prefix(paths: &InstallPaths) -> Check {
    let prefix = paths.prefix();
    if prefix.is_dir() {
        Check::ok("Install prefix", format!("Found at {}", prefix.display()))
    } else {
        Check::warning(
            "Install prefix",
            format!(
                "Not found at {}. Set MATLAB_RUNTIME_PATH or pass --prefix.",
                prefix.display()
            ),
        )
    }
}

fn check_sdk_dirs(paths: &InstallPaths, release: &Release, platform: Platform) -> Check {
    let missing: Vec<String> = paths
        .sdk_search_dirs(release, platform)
        .iter()
        .filter(|dir| !dir.is_dir())
        .map(|dir| dir.display().to_string())
        .collect();
    if missing.is_empty() {
        Check::ok("SDK directories", format!("All present for {release}"))
    } else {
        Check::warning("SDK directories", format!("Missing: {}", missing.join(", ")))
    }
}

fn check_runtime_library(paths: &InstallPaths, release: &Release, platform: Platform) -> Check {
    let mut search_path = SearchPath::new();
    search_path.prepend(paths.sdk_search_dirs(release, platform));
    match search_path.find_library(RUNTIME_LIBRARY) {
        Some(library) => Check::ok("Runtime library", format!("Found at {}", library.display())),
        None => Check::error(
            "Runtime library",
            format!("{RUNTIME_LIBRARY} not found for {release}. Reinstall the runtime."),
        ),
    }
}

fn check_version_info(paths: &InstallPaths, release: &Release) -> Check {
    let file = paths.release_dir(release).join(VERSION_INFO_FILE);
    let Ok(xml) = std::fs::read_to_string(&file) else {
        return Check::warning(
            "Runtime version",
            format!("{} not readable", file.display()),
        );
    };
    let Some(version) = parse_version_info(&xml) else {
        return Check::warning("Runtime version", format!("No version in {}", file.display()));
    };
    let expected = release.numeric_version().as_deref().and_then(major_minor);
    match (expected, major_minor(version)) {
        (Some(expected), Some(loaded)) if expected != loaded => Check::error(
            "Runtime version",
            format!("{release} directory contains runtime {version}"),
        ),
        _ => Check::ok("Runtime version", format!("{version} ({release})")),
    }
}
