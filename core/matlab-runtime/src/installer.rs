//! Install and uninstall of MATLAB Runtime releases.
//!
//! ## Install
//!
//! 1. Resolve the release and its installer URL
//! 2. If the release is already installed, ask whether to reinstall
//!    (declining is a successful no-op)
//! 3. Confirm the download, download into a scoped staging directory
//! 4. Confirm and unpack ZIP installers with [`extract_zip`]
//! 5. Confirm the license agreement
//! 6. On recent macOS, strip the quarantine attribute from the staging tree
//! 7. Run the vendor installer in silent mode
//! 8. Verify the license marker under the prefix
//!
//! The staging directory is removed on every exit path, including declined
//! confirmations and installer failures.
//!
//! ## Uninstall
//!
//! Windows releases are removed with their bundled uninstaller. Elsewhere the
//! release directory (or the whole prefix for `all`) is deleted.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::archive::extract_zip;
use crate::confirm::{Answer, ConfirmationGate};
use crate::errors::{Error, IoContext, Result};
use crate::fetch::Fetch;
use crate::paths::{InstallPaths, LICENSE_MARKER};
use crate::platform::{self, Platform};
use crate::resolver::{InstallerResolver, VersionRequest};

/// Newest macOS release on which downloaded installers run without removing
/// their quarantine attribute.
const QUARANTINE_FREE_MACOS: (u32, u32) = (10, 14);

/// Drives the vendor installer and uninstaller for one install prefix.
#[derive(Debug)]
pub struct Installer<F: Fetch> {
    platform: Platform,
    paths: InstallPaths,
    gate: ConfirmationGate,
    resolver: InstallerResolver,
    fetcher: F,
}

impl<F: Fetch> Installer<F> {
    /// Assembles an installer from its parts.
    pub fn new(
        platform: Platform,
        paths: InstallPaths,
        gate: ConfirmationGate,
        resolver: InstallerResolver,
        fetcher: F,
    ) -> Self {
        Self {
            platform,
            paths,
            gate,
            resolver,
            fetcher,
        }
    }

    /// Returns the platform installers are resolved for.
    #[must_use]
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Returns the install prefix layout.
    #[must_use]
    pub fn paths(&self) -> &InstallPaths {
        &self.paths
    }

    /// Returns the resolver, including releases discovered by probing.
    #[must_use]
    pub fn resolver(&self) -> &InstallerResolver {
        &self.resolver
    }

    /// Returns the fetcher.
    #[must_use]
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Resolves a request against this installer's platform and prefix.
    ///
    /// # Errors
    ///
    /// See [`InstallerResolver::resolve_release`].
    pub async fn resolve(&mut self, request: &VersionRequest) -> Result<crate::Release> {
        self.resolver
            .resolve_release(request, self.platform, &self.paths, &self.fetcher)
            .await
    }

    /// Installs one release and returns its directory under the prefix.
    ///
    /// If the release is already installed and reinstalling is declined,
    /// nothing is downloaded and the existing directory is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The release cannot be resolved ([`Error::InvalidVersion`],
    ///   [`Error::VersionNotFound`])
    /// - A required confirmation is declined ([`Error::UserDeclined`])
    /// - The download or extraction fails
    /// - The archive holds no installer, or the installer does not produce
    ///   the license marker ([`Error::MarkerNotFound`])
    pub async fn install(&mut self, request: &VersionRequest) -> Result<PathBuf> {
        let release = self.resolve(request).await?;
        let url = self
            .resolver
            .installer_url(&release, self.platform, &self.fetcher)
            .await?;
        let release_dir = self.paths.release_dir(&release);

        if self.paths.is_installed(&release) {
            if !self
                .gate
                .ask("Runtime already exists. Reinstall?", Answer::No)?
            {
                println!("Do not reinstall: {}", release_dir.display());
                return Ok(release_dir);
            }
            println!("Runtime already exists. Reinstalling...");
        }

        self.gate
            .require(&format!("Download installer from {url}?"), Answer::Yes)?;

        let staging = tempfile::Builder::new()
            .prefix("matlab-runtime-")
            .tempdir()
            .io_context(|| "Failed to create staging directory")?;

        println!("Downloading from {url} ...");
        tracing::info!(%release, platform = %self.platform, %url, "downloading installer");
        let mut installer = self.fetcher.download(&url, staging.path()).await?;
        println!("done -> {}", installer.display());

        if installer.extension().is_some_and(|ext| ext == "zip") {
            self.gate
                .require(&format!("Unzip {}?", installer.display()), Answer::Yes)?;
            extract_zip(&installer, staging.path())?;
            tracing::info!(archive = %installer.display(), "installer unpacked");
            installer = staging.path().join(self.platform.installer_name());
        }

        if !installer.is_file() {
            return Err(Error::marker_not_found("installer", installer));
        }

        let question = format!(
            "By running this code, you agree to the MATLAB Runtime license agreement:\n\t{}\n",
            staging.path().join(LICENSE_MARKER).display()
        );
        self.gate.require(&question, Answer::Yes)?;
        println!("License agreed.");

        if self.platform.is_macos() && needs_quarantine_removal() {
            strip_quarantine(staging.path());
        }

        run_installer(&installer, self.paths.prefix(), staging.path())?;

        let marker = self.paths.license_marker(&release);
        if !marker.is_file() {
            return Err(Error::marker_not_found("Runtime", marker));
        }

        tracing::info!(%release, dir = %release_dir.display(), "runtime installed");
        println!("Runtime successfully installed at: {}", release_dir.display());
        println!("License agreement available at: {}", marker.display());
        Ok(release_dir)
    }

    /// Installs several releases in order, collecting their directories
    /// into the caller's container type.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first failure.
    pub async fn install_all<I, C>(&mut self, requests: I) -> Result<C>
    where
        I: IntoIterator<Item = VersionRequest>,
        C: FromIterator<PathBuf>,
    {
        let mut dirs = Vec::new();
        for request in requests {
            dirs.push(self.install(&request).await?);
        }
        Ok(dirs.into_iter().collect())
    }

    /// Uninstalls one release, or every release for [`VersionRequest::All`],
    /// and returns the directory that was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The release cannot be resolved
    /// - The directory does not exist ([`Error::MarkerNotFound`])
    /// - The removal is declined ([`Error::UserDeclined`])
    /// - The uninstaller cannot be started or the directory cannot be deleted
    pub async fn uninstall(&mut self, request: &VersionRequest) -> Result<PathBuf> {
        let release = match request {
            VersionRequest::All => None,
            other => Some(self.resolve(other).await?),
        };
        let target = release
            .as_ref()
            .map_or_else(|| self.paths.prefix().to_path_buf(), |r| self.paths.release_dir(r));

        if !target.is_dir() {
            return Err(Error::marker_not_found("Runtime directory", target));
        }

        self.gate.require(
            &format!("Remove directory {} and its content?", target.display()),
            Answer::Yes,
        )?;

        if self.platform.is_windows() {
            let release_dirs = match release {
                Some(_) => vec![target.clone()],
                None => self.paths.release_dirs()?,
            };
            for dir in release_dirs {
                run_uninstaller(&InstallPaths::uninstaller(&dir, self.platform))?;
            }
        } else {
            fs::remove_dir_all(&target)
                .io_context(|| format!("Failed to remove directory: {}", target.display()))?;
        }

        tracing::info!(dir = %target.display(), "runtime uninstalled");
        println!("Runtime(s) successfully uninstalled from: {}", target.display());
        Ok(target)
    }

    /// Uninstalls several releases independently.
    ///
    /// A failure for one release is reported and does not stop the others.
    /// The failures are returned so callers can report or count them.
    pub async fn uninstall_all<I>(&mut self, requests: I) -> Vec<(VersionRequest, Error)>
    where
        I: IntoIterator<Item = VersionRequest>,
    {
        let mut failures = Vec::new();
        for request in requests {
            if let Err(e) = self.uninstall(&request).await {
                tracing::warn!(%request, error = %e, "failed to uninstall runtime");
                eprintln!("Failed to uninstall runtime {request}: {e}");
                failures.push((request, e));
            }
        }
        failures
    }
}

fn needs_quarantine_removal() -> bool {
    match platform::macos_version() {
        Ok(version) => version > QUARANTINE_FREE_MACOS,
        Err(e) => {
            tracing::warn!(error = %e, "cannot read macOS version, assuming quarantine is enforced");
            true
        }
    }
}

/// Removes the quarantine attribute so Gatekeeper lets the unsigned
/// installer binaries run. Needs `sudo`.
fn strip_quarantine(dir: &Path) {
    println!("Running the MATLAB installer requires signing off its binaries, which requires sudo:");
    let status = Command::new("sudo")
        .args(["xattr", "-r", "-d", "com.apple.quarantine"])
        .arg(dir)
        .status();
    match status {
        Ok(status) if status.success() => {}
        Ok(status) => tracing::warn!(%status, "xattr exited with failure"),
        Err(e) => tracing::warn!(error = %e, "failed to run xattr"),
    }
}

/// Runs the vendor installer unattended.
///
/// A non-zero exit status is only logged: the license marker check that
/// follows decides whether the install worked.
fn run_installer(installer: &Path, prefix: &Path, tmpdir: &Path) -> Result<()> {
    tracing::info!(installer = %installer.display(), prefix = %prefix.display(), "running installer");
    let status = Command::new(installer)
        .arg("-destinationFolder")
        .arg(prefix)
        .arg("-tmpdir")
        .arg(tmpdir)
        .args(["-mode", "silent", "-agreeToLicense", "yes"])
        .status()
        .map_err(|e| Error::installer(format!("Failed to run {}", installer.display()), e))?;
    if !status.success() {
        tracing::warn!(%status, installer = %installer.display(), "installer exited with failure");
    }
    Ok(())
}

fn run_uninstaller(uninstaller: &Path) -> Result<()> {
    tracing::info!(uninstaller = %uninstaller.display(), "running uninstaller");
    let status = Command::new(uninstaller)
        .status()
        .map_err(|e| Error::installer(format!("Failed to run {}", uninstaller.display()), e))?;
    if !status.success() {
        tracing::warn!(%status, uninstaller = %uninstaller.display(), "uninstaller exited with failure");
    }
    Ok(())
}
