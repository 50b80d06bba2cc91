//! On-disk layout of MATLAB Runtime installations.
//!
//! No installation state is kept in memory: every query re-reads the install
//! prefix. A release counts as installed when its license agreement file is
//! present.
//!
//! ## Directory Structure
//!
//! ```text
//! <prefix>/                           # MATLAB_RUNTIME_PATH or platform default
//! └── R2022b/
//!     ├── matlabruntime_license_agreement.pdf   # installation marker
//!     ├── bin/<platform>/
//!     │   └── Uninstall_MATLAB_Runtime.exe      # Windows only
//!     ├── extern/bin/<platform>/
//!     └── toolbox/compiler_sdk/pysdk_py/
//!         └── matlab_mod_dist/
//! ```
//!
//! ## Environment Variables
//!
//! - `MATLAB_RUNTIME_PATH`: overrides the default install prefix.

use std::fs;
use std::path::{Path, PathBuf};

use crate::catalog::Release;
use crate::errors::{IoContext, Result};
use crate::platform::Platform;

/// Environment variable overriding the install prefix.
pub const PREFIX_ENV: &str = "MATLAB_RUNTIME_PATH";

/// File whose presence witnesses an installed release.
pub const LICENSE_MARKER: &str = "matlabruntime_license_agreement.pdf";

/// File name of the per-release uninstaller on Windows.
pub const UNINSTALLER_NAME: &str = "Uninstall_MATLAB_Runtime.exe";

/// Returns the vendor's default install prefix for a platform.
#[must_use]
pub fn default_prefix(platform: Platform) -> PathBuf {
    if platform.is_windows() {
        PathBuf::from(r"C:\Program Files\MATLAB\MATLAB Runtime\")
    } else if platform.is_macos() {
        PathBuf::from("/Applications/MATLAB/MATLAB_Runtime")
    } else {
        PathBuf::from("/usr/local/MATLAB/MATLAB_Runtime")
    }
}

/// Paths below an install prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPaths {
    prefix: PathBuf,
}

impl InstallPaths {
    /// Uses an explicit prefix.
    #[must_use = "returns new paths instance without side effects"]
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Uses `MATLAB_RUNTIME_PATH` when set and non-empty, otherwise the
    /// platform default.
    #[must_use]
    pub fn from_env(platform: Platform) -> Self {
        match std::env::var_os(PREFIX_ENV) {
            Some(prefix) if !prefix.is_empty() => Self::new(prefix),
            _ => Self::new(default_prefix(platform)),
        }
    }

    /// Returns `prefix` when given, otherwise [`InstallPaths::from_env`].
    #[must_use]
    pub fn resolve(prefix: Option<PathBuf>, platform: Platform) -> Self {
        prefix.map_or_else(|| Self::from_env(platform), Self::new)
    }

    /// Returns the install prefix.
    #[must_use = "returns the path without side effects"]
    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    /// Returns the directory of one release.
    #[must_use = "returns the path without side effects"]
    pub fn release_dir(&self, release: &Release) -> PathBuf {
        self.prefix.join(release.as_str())
    }

    /// Returns the license marker of one release.
    #[must_use = "returns the path without side effects"]
    pub fn license_marker(&self, release: &Release) -> PathBuf {
        self.release_dir(release).join(LICENSE_MARKER)
    }

    /// Checks whether a release is installed.
    #[must_use = "returns installation status without side effects"]
    pub fn is_installed(&self, release: &Release) -> bool {
        self.license_marker(release).is_file()
    }

    /// Lists installed releases, oldest first.
    ///
    /// Directories without the license marker (interrupted installs,
    /// unrelated folders) are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix exists but cannot be read.
    pub fn installed_releases(&self) -> Result<Vec<Release>> {
        if !self.prefix.is_dir() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.prefix)
            .io_context(|| format!("Failed to read install prefix: {}", self.prefix.display()))?;

        let mut releases = Vec::new();
        for entry in entries {
            let entry = entry.io_context(|| "Failed to read directory entry")?;
            let path = entry.path();
            if path.join(LICENSE_MARKER).is_file()
                && let Some(name) = path.file_name().and_then(|n| n.to_str())
                && let Ok(release) = Release::normalize(name)
            {
                releases.push(release);
            }
        }

        releases.sort();
        Ok(releases)
    }

    /// Returns the most recent installed release, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix exists but cannot be read.
    pub fn latest_installed(&self) -> Result<Option<Release>> {
        Ok(self.installed_releases()?.pop())
    }

    /// Lists every directory directly below the prefix, marker or not.
    ///
    /// This is what a full uninstall walks on Windows.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix exists but cannot be read.
    pub fn release_dirs(&self) -> Result<Vec<PathBuf>> {
        if !self.prefix.is_dir() {
            return Ok(Vec::new());
        }
        let mut dirs = Vec::new();
        for entry in fs::read_dir(&self.prefix)
            .io_context(|| format!("Failed to read install prefix: {}", self.prefix.display()))?
        {
            let path = entry.io_context(|| "Failed to read directory entry")?.path();
            if path.is_dir() {
                dirs.push(path);
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    /// Returns the directories searched for the runtime's native libraries,
    /// in priority order: extension binaries, SDK, SDK modules, runtime
    /// binaries.
    #[must_use]
    pub fn sdk_search_dirs(&self, release: &Release, platform: Platform) -> [PathBuf; 4] {
        let root = self.release_dir(release);
        let sdk = root.join("toolbox").join("compiler_sdk").join("pysdk_py");
        [
            root.join("extern").join("bin").join(platform.as_str()),
            sdk.clone(),
            sdk.join("matlab_mod_dist"),
            root.join("bin").join(platform.as_str()),
        ]
    }

    /// Returns the Windows uninstaller bundled with a release directory.
    #[must_use = "returns the path without side effects"]
    pub fn uninstaller(release_dir: &Path, platform: Platform) -> PathBuf {
        release_dir
            .join("bin")
            .join(platform.as_str())
            .join(UNINSTALLER_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn release(label: &str) -> Release {
        Release::normalize(label).expect("Should normalize")
    }

    fn mark_installed(paths: &InstallPaths, label: &str) {
        let dir = paths.release_dir(&release(label));
        fs::create_dir_all(&dir).expect("Should create release dir");
        fs::write(dir.join(LICENSE_MARKER), b"%PDF").expect("Should write marker");
    }

    #[test]
    fn default_prefix_follows_vendor_layout() {
        assert_eq!(
            default_prefix(Platform::Glnxa64),
            PathBuf::from("/usr/local/MATLAB/MATLAB_Runtime")
        );
        assert_eq!(
            default_prefix(Platform::Maca64),
            PathBuf::from("/Applications/MATLAB/MATLAB_Runtime")
        );
        assert!(
            default_prefix(Platform::Win64)
                .to_string_lossy()
                .starts_with(r"C:\Program Files\MATLAB")
        );
    }

    #[test]
    #[serial]
    fn from_env_prefers_environment_variable() {
        let temp = tempfile::tempdir().unwrap();
        // SAFETY: serialized with every other test touching the environment.
        unsafe { std::env::set_var(PREFIX_ENV, temp.path()) };
        let paths = InstallPaths::from_env(Platform::Glnxa64);
        unsafe { std::env::remove_var(PREFIX_ENV) };

        assert_eq!(paths.prefix(), temp.path());
    }

    #[test]
    #[serial]
    fn from_env_ignores_empty_variable() {
        // SAFETY: serialized with every other test touching the environment.
        unsafe { std::env::set_var(PREFIX_ENV, "") };
        let paths = InstallPaths::from_env(Platform::Glnxa64);
        unsafe { std::env::remove_var(PREFIX_ENV) };

        assert_eq!(paths.prefix(), default_prefix(Platform::Glnxa64));
    }

    #[test]
    fn explicit_prefix_wins_over_environment() {
        let paths = InstallPaths::resolve(Some(PathBuf::from("/opt/mcr")), Platform::Glnxa64);
        assert_eq!(paths.prefix(), Path::new("/opt/mcr"));
    }

    #[test]
    fn marker_decides_installation_status() {
        let temp = tempfile::tempdir().unwrap();
        let paths = InstallPaths::new(temp.path());
        let r2022b = release("R2022b");

        fs::create_dir_all(paths.release_dir(&r2022b)).unwrap();
        assert!(!paths.is_installed(&r2022b));

        mark_installed(&paths, "R2022b");
        assert!(paths.is_installed(&r2022b));
        assert_eq!(
            paths.license_marker(&r2022b),
            temp.path().join("R2022b").join(LICENSE_MARKER)
        );
    }

    #[test]
    fn installed_releases_are_sorted_and_require_marker() {
        let temp = tempfile::tempdir().unwrap();
        let paths = InstallPaths::new(temp.path());
        mark_installed(&paths, "R2023b");
        mark_installed(&paths, "R2019a");
        mark_installed(&paths, "R2021a");
        fs::create_dir_all(temp.path().join("R2024a")).unwrap();
        fs::create_dir_all(temp.path().join("scratch")).unwrap();

        let installed = paths.installed_releases().expect("Should list");
        let labels: Vec<_> = installed.iter().map(Release::as_str).collect();
        assert_eq!(labels, ["R2019a", "R2021a", "R2023b"]);
    }

    #[test]
    fn latest_installed_skips_unmarked_directories() {
        let temp = tempfile::tempdir().unwrap();
        let paths = InstallPaths::new(temp.path());
        mark_installed(&paths, "R2022a");
        fs::create_dir_all(temp.path().join("R2024b")).unwrap();

        let latest = paths.latest_installed().expect("Should scan");
        assert_eq!(latest, Some(release("R2022a")));
    }

    #[test]
    fn missing_prefix_means_nothing_installed() {
        let paths = InstallPaths::new("/nonexistent/matlab/runtime/prefix");
        assert!(paths.installed_releases().unwrap().is_empty());
        assert_eq!(paths.latest_installed().unwrap(), None);
        assert!(paths.release_dirs().unwrap().is_empty());
    }

    #[test]
    fn sdk_search_dirs_are_ordered() {
        let paths = InstallPaths::new("/mcr");
        let dirs = paths.sdk_search_dirs(&release("R2022b"), Platform::Glnxa64);
        let root = Path::new("/mcr/R2022b");
        assert_eq!(
            dirs,
            [
                root.join("extern/bin/glnxa64"),
                root.join("toolbox/compiler_sdk/pysdk_py"),
                root.join("toolbox/compiler_sdk/pysdk_py/matlab_mod_dist"),
                root.join("bin/glnxa64"),
            ]
        );
    }

    #[test]
    fn uninstaller_lives_in_platform_bin() {
        let path = InstallPaths::uninstaller(Path::new("/mcr/R2022b"), Platform::Win64);
        assert_eq!(
            path,
            Path::new("/mcr/R2022b/bin/win64/Uninstall_MATLAB_Runtime.exe")
        );
    }
}
