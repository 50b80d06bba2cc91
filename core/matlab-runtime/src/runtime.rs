//! Process runtime context: SDK setup, runtime start/stop and deployed
//! package handles.
//!
//! ## Lifecycle
//!
//! ```text
//! Uninitialized --init_sdk--> SdkReady --init_runtime--> RuntimeReady
//!                                 ^                          |
//!                                 |                  terminate_runtime
//!                                 |                          v
//!                                 +------init_runtime---- Terminated
//! ```
//!
//! `init_runtime` from `Uninitialized` runs `init_sdk` first, and
//! `import_deployed` from any state but `RuntimeReady` runs `init_runtime`
//! first. The SDK is set up at most once per context: a native library cannot
//! be unloaded, so a second `init_sdk` is refused instead of silently mixing
//! two releases.
//!
//! ## Handles
//!
//! Deployed packages are shared as `Rc<DeployedHandle<_>>`. The context keeps
//! only weak references: a package is terminated by [`DeployedHandle::close`]
//! or when its last `Rc` is dropped, and importing it again afterwards opens
//! a fresh handle. [`RuntimeContext::shutdown`], also run on drop, closes
//! every live handle before terminating the runtime.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::{Rc, Weak};

use crate::catalog::Release;
use crate::errors::{Error, Result};
use crate::fetch::Fetch;
use crate::installer::Installer;
use crate::native::{DeployedPackage, PackageBackend, RuntimeBackend, SearchPath, major_minor};
use crate::resolver::VersionRequest;

/// Runtime options that only take effect when given to the launcher on
/// macOS.
const MACOS_LAUNCH_ONLY_OPTIONS: [&str; 2] = ["-nodisplay", "-nojvm"];

/// Where a [`RuntimeContext`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Nothing loaded yet.
    Uninitialized,
    /// Runtime library loaded and version checked.
    SdkReady,
    /// Runtime application initialized.
    RuntimeReady,
    /// Runtime application terminated; the SDK stays loaded.
    Terminated,
}

/// A deployed package that has been initialized against the runtime.
pub struct DeployedHandle<P: PackageBackend> {
    package: DeployedPackage,
    backend: RefCell<Option<P>>,
}

impl<P: PackageBackend> DeployedHandle<P> {
    /// Returns the package this handle was opened for.
    #[must_use]
    pub fn package(&self) -> &DeployedPackage {
        &self.package
    }

    /// Returns whether the package has not been terminated yet.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.backend.borrow().is_some()
    }

    /// Terminates the package. Later calls do nothing.
    ///
    /// # Errors
    ///
    /// Returns the package's termination error.
    pub fn close(&self) -> Result<()> {
        let backend = self.backend.borrow_mut().take();
        match backend {
            Some(mut backend) => {
                tracing::debug!(package = self.package.name(), "terminating deployed package");
                backend.terminate()
            }
            None => Ok(()),
        }
    }
}

impl<P: PackageBackend> Drop for DeployedHandle<P> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(package = self.package.name(), error = %e, "failed to terminate deployed package");
        }
    }
}

impl<P: PackageBackend> std::fmt::Debug for DeployedHandle<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployedHandle")
            .field("package", &self.package)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Shared handle to a deployed package.
pub type Handle<B> = Rc<DeployedHandle<<B as RuntimeBackend>::Package>>;

/// Explicit owner of the process's MATLAB Runtime state.
///
/// Create one per process and pass it to the code that needs the runtime.
pub struct RuntimeContext<B: RuntimeBackend, F: Fetch> {
    installer: Installer<F>,
    backend: B,
    state: LifecycleState,
    release: Option<Release>,
    search_path: SearchPath,
    handles: HashMap<DeployedPackage, Weak<DeployedHandle<B::Package>>>,
}

impl<B: RuntimeBackend, F: Fetch> RuntimeContext<B, F> {
    /// Creates an uninitialized context.
    pub fn new(installer: Installer<F>, backend: B) -> Self {
        Self {
            installer,
            backend,
            state: LifecycleState::Uninitialized,
            release: None,
            search_path: SearchPath::new(),
            handles: HashMap::new(),
        }
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Returns the release the SDK was set up for.
    #[must_use]
    pub fn release(&self) -> Option<&Release> {
        self.release.as_ref()
    }

    /// Returns the native library search path set up by `init_sdk`.
    #[must_use]
    pub fn search_path(&self) -> &SearchPath {
        &self.search_path
    }

    /// Returns the installer used for on-demand installs.
    #[must_use]
    pub fn installer(&self) -> &Installer<F> {
        &self.installer
    }

    /// Returns the native backend.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Loads the runtime of one installed release.
    ///
    /// `LatestInstalled` picks the newest release that has a license marker
    /// under the prefix, or the latest published release when none does.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The SDK is already set up ([`Error::AlreadyInitialized`])
    /// - The release is not installed and `install_if_missing` is false
    ///   ([`Error::MarkerNotFound`]), or installing it fails
    /// - The runtime library cannot be loaded
    /// - The loaded runtime is another release ([`Error::VersionMismatch`])
    pub async fn init_sdk(
        &mut self,
        request: &VersionRequest,
        install_if_missing: bool,
    ) -> Result<()> {
        if self.state != LifecycleState::Uninitialized {
            return Err(Error::already_initialized("MATLAB SDK"));
        }

        let release = self.installer.resolve(request).await?;
        let paths = self.installer.paths().clone();
        let release_dir = paths.release_dir(&release);

        if !paths.is_installed(&release) {
            if install_if_missing {
                self.installer.install(&VersionRequest::from(&release)).await?;
            } else {
                return Err(Error::marker_not_found("Runtime", release_dir));
            }
        }

        let platform = self.installer.platform();
        let [ext, sdk, modules, bin] = paths.sdk_search_dirs(&release, platform);
        if platform.is_windows() {
            prepend_os_path(&[ext.as_path(), bin.as_path()])?;
        }
        self.search_path.prepend([ext, sdk, modules, bin]);
        tracing::debug!(dirs = ?self.search_path.dirs(), "native search path");

        self.backend.load(&release_dir, &self.search_path)?;
        check_version(&release, &self.backend.version()?)?;

        tracing::info!(%release, "MATLAB SDK ready");
        self.release = Some(release);
        self.state = LifecycleState::SdkReady;
        Ok(())
    }

    /// Starts the runtime application, setting up the SDK first if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyInitialized`] if the runtime is running,
    /// any `init_sdk` error, or the backend's initialization error.
    pub async fn init_runtime(&mut self, options: &[String]) -> Result<()> {
        if self.state == LifecycleState::RuntimeReady {
            return Err(Error::already_initialized("MATLAB runtime"));
        }
        if self.state == LifecycleState::Uninitialized {
            self.init_sdk(&VersionRequest::LatestInstalled, false).await?;
        }

        if self.installer.platform().is_macos() {
            let ignored = launch_only_options(options);
            if !ignored.is_empty() {
                tracing::warn!(
                    ?ignored,
                    "options \"-nodisplay\" and \"-nojvm\" are ignored on macOS; \
                     they must be passed to the launcher to take effect"
                );
            }
        }

        self.backend.initialize_application(options)?;
        tracing::info!(?options, "MATLAB runtime ready");
        self.state = LifecycleState::RuntimeReady;
        Ok(())
    }

    /// Returns an initialized handle to a deployed package.
    ///
    /// A handle that is still alive and open is returned as is; otherwise
    /// the package is opened and initialized again.
    ///
    /// # Errors
    ///
    /// Returns any `init_runtime` error, or the package's load or
    /// initialization error.
    pub async fn import_deployed(&mut self, package: &DeployedPackage) -> Result<Handle<B>> {
        if self.state != LifecycleState::RuntimeReady {
            self.init_runtime(&[]).await?;
        }

        if let Some(handle) = self.handles.get(package).and_then(Weak::upgrade)
            && handle.is_open()
        {
            tracing::debug!(package = package.name(), "reusing deployed package handle");
            return Ok(handle);
        }

        let mut backend = self.backend.open_package(package)?;
        backend.initialize()?;
        let handle = Rc::new(DeployedHandle {
            package: package.clone(),
            backend: RefCell::new(Some(backend)),
        });

        self.handles.retain(|_, weak| weak.strong_count() > 0);
        self.handles.insert(package.clone(), Rc::downgrade(&handle));
        tracing::info!(package = package.name(), "deployed package initialized");
        Ok(handle)
    }

    /// Imports several packages, in order.
    ///
    /// # Errors
    ///
    /// Stops at the first failing package.
    pub async fn import_deployed_many(
        &mut self,
        packages: &[DeployedPackage],
    ) -> Result<Vec<Handle<B>>> {
        let mut handles = Vec::with_capacity(packages.len());
        for package in packages {
            handles.push(self.import_deployed(package).await?);
        }
        Ok(handles)
    }

    /// Stops the runtime application. Does nothing if it is not running.
    ///
    /// # Errors
    ///
    /// Returns the backend's termination error.
    pub fn terminate_runtime(&mut self) -> Result<()> {
        if self.state != LifecycleState::RuntimeReady {
            return Ok(());
        }
        self.backend.terminate_application()?;
        tracing::info!("MATLAB runtime terminated");
        self.state = LifecycleState::Terminated;
        Ok(())
    }

    /// Closes every live package handle, forgets them, then terminates the
    /// runtime.
    ///
    /// # Errors
    ///
    /// Returns the runtime's termination error. Package termination errors
    /// are logged.
    pub fn shutdown(&mut self) -> Result<()> {
        for (package, weak) in self.handles.drain() {
            if let Some(handle) = weak.upgrade()
                && let Err(e) = handle.close()
            {
                tracing::warn!(package = package.name(), error = %e, "failed to terminate deployed package");
            }
        }
        self.terminate_runtime()
    }
}

impl<B: RuntimeBackend, F: Fetch> Drop for RuntimeContext<B, F> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(error = %e, "failed to shut down MATLAB runtime");
        }
    }
}

/// Returns the options that only take effect when given to the macOS
/// launcher.
fn launch_only_options(options: &[String]) -> Vec<&str> {
    options
        .iter()
        .map(String::as_str)
        .filter(|o| MACOS_LAUNCH_ONLY_OPTIONS.contains(o))
        .collect()
}

/// Compares `major.minor` of the requested release with the loaded runtime.
fn check_version(release: &Release, loaded: &str) -> Result<()> {
    let expected = release
        .numeric_version()
        .ok_or_else(|| Error::invalid_version(release.as_str()))?;
    let expected_mm = major_minor(&expected);
    let loaded_mm = major_minor(loaded);
    if expected_mm.is_none() || expected_mm != loaded_mm {
        let render = |mm: Option<(u32, u32)>, raw: &str| {
            mm.map_or_else(|| raw.to_string(), |(major, minor)| format!("{major}.{minor}"))
        };
        return Err(Error::version_mismatch(
            render(expected_mm, &expected),
            render(loaded_mm, loaded),
        ));
    }
    Ok(())
}

/// Puts `dirs` in front of the executable search path so Windows resolves
/// the runtime's dependent DLLs.
fn prepend_os_path(dirs: &[&Path]) -> Result<()> {
    let current = std::env::var_os("PATH").unwrap_or_default();
    let joined = std::env::join_paths(
        dirs.iter()
            .map(|d| d.to_path_buf())
            .chain(std::env::split_paths(&current)),
    )
    .map_err(|e| {
        Error::io(
            "Cannot add runtime directories to PATH",
            std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
        )
    })?;
    // SAFETY: the runtime context is used from one thread, and PATH is set
    // before any runtime library is loaded.
    unsafe { std::env::set_var("PATH", joined) };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::confirm::ConfirmationGate;
    use crate::installer::tests::{ArchiveFetcher, BASE};
    use crate::paths::{InstallPaths, LICENSE_MARKER};
    use crate::platform::Platform;
    use crate::resolver::InstallerResolver;
    use std::io::Cursor;

    #[derive(Clone, Default)]
    struct Events(Rc<RefCell<Vec<String>>>);

    impl Events {
        fn push(&self, event: impl Into<String>) {
            self.0.borrow_mut().push(event.into());
        }

        fn all(&self) -> Vec<String> {
            self.0.borrow().clone()
        }

        fn count(&self, event: &str) -> usize {
            self.0.borrow().iter().filter(|e| *e == event).count()
        }
    }

    struct FakeBackend {
        events: Events,
        version: String,
    }

    struct FakePackage {
        name: String,
        events: Events,
    }

    impl RuntimeBackend for FakeBackend {
        type Package = FakePackage;

        fn load(&mut self, release_root: &Path, _search_path: &SearchPath) -> Result<()> {
            let name = release_root.file_name().unwrap().to_string_lossy();
            self.events.push(format!("load {name}"));
            Ok(())
        }

        fn version(&self) -> Result<String> {
            Ok(self.version.clone())
        }

        fn initialize_application(&mut self, options: &[String]) -> Result<()> {
            self.events
                .push(format!("initialize_application {}", options.join(" ")).trim_end().to_string());
            Ok(())
        }

        fn terminate_application(&mut self) -> Result<()> {
            self.events.push("terminate_application");
            Ok(())
        }

        fn open_package(&mut self, package: &DeployedPackage) -> Result<FakePackage> {
            self.events.push(format!("open {}", package.name()));
            Ok(FakePackage {
                name: package.name().to_string(),
                events: self.events.clone(),
            })
        }
    }

    impl PackageBackend for FakePackage {
        fn initialize(&mut self) -> Result<()> {
            self.events.push(format!("initialize {}", self.name));
            Ok(())
        }

        fn terminate(&mut self) -> Result<()> {
            self.events.push(format!("terminate {}", self.name));
            Ok(())
        }
    }

    fn mark_installed(prefix: &Path, label: &str) {
        let dir = prefix.join(label);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(LICENSE_MARKER), b"%PDF").unwrap();
    }

    fn context(
        prefix: &Path,
        version: &str,
        events: &Events,
    ) -> RuntimeContext<FakeBackend, ArchiveFetcher> {
        context_on(Platform::Glnxa64, prefix, version, events)
    }

    fn context_on(
        platform: Platform,
        prefix: &Path,
        version: &str,
        events: &Events,
    ) -> RuntimeContext<FakeBackend, ArchiveFetcher> {
        let installer = Installer::new(
            platform,
            InstallPaths::new(prefix),
            ConfirmationGate::new(true, Cursor::new(""), std::io::sink()),
            InstallerResolver::with_year(Catalog::new(BASE), 2030),
            ArchiveFetcher::new(crate::installer::tests::installer_archive("R2023b")),
        );
        let backend = FakeBackend {
            events: events.clone(),
            version: version.to_string(),
        };
        RuntimeContext::new(installer, backend)
    }

    fn package(name: &str) -> DeployedPackage {
        DeployedPackage::new(name, format!("/pkgs/lib{name}.so"))
    }

    #[tokio::test]
    async fn init_sdk_twice_is_already_initialized() {
        let temp = tempfile::tempdir().unwrap();
        mark_installed(temp.path(), "R2022b");
        let events = Events::default();
        let mut ctx = context(temp.path(), "9.13.0.2049777", &events);

        ctx.init_sdk(&VersionRequest::parse("R2022b"), false)
            .await
            .expect("Should set up the SDK");
        let err = ctx
            .init_sdk(&VersionRequest::parse("R2022b"), false)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::AlreadyInitialized { what: "MATLAB SDK" }));
        assert_eq!(events.count("load R2022b"), 1);
    }

    #[tokio::test]
    async fn init_sdk_uses_latest_installed_and_prepends_search_dirs() {
        let temp = tempfile::tempdir().unwrap();
        mark_installed(temp.path(), "R2021a");
        mark_installed(temp.path(), "R2022b");
        std::fs::create_dir_all(temp.path().join("R2024b")).unwrap();
        let events = Events::default();
        let mut ctx = context(temp.path(), "9.13", &events);

        ctx.init_sdk(&VersionRequest::LatestInstalled, false)
            .await
            .expect("Should pick R2022b");

        assert_eq!(ctx.state(), LifecycleState::SdkReady);
        assert_eq!(ctx.release().map(Release::as_str), Some("R2022b"));
        let root = temp.path().join("R2022b");
        assert_eq!(
            ctx.search_path().dirs(),
            [
                root.join("extern/bin/glnxa64"),
                root.join("toolbox/compiler_sdk/pysdk_py"),
                root.join("toolbox/compiler_sdk/pysdk_py/matlab_mod_dist"),
                root.join("bin/glnxa64"),
            ]
        );
    }

    #[tokio::test]
    async fn init_sdk_without_install_requires_marker() {
        let temp = tempfile::tempdir().unwrap();
        let events = Events::default();
        let mut ctx = context(temp.path(), "9.13", &events);

        let err = ctx
            .init_sdk(&VersionRequest::parse("R2022b"), false)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::MarkerNotFound { .. }));
        assert_eq!(ctx.state(), LifecycleState::Uninitialized);
        assert!(events.all().is_empty());
        assert!(ctx.installer().fetcher().downloads.borrow().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    #[serial_test::serial(installer_process)]
    async fn init_sdk_installs_missing_release_when_permitted() {
        let temp = tempfile::tempdir().unwrap();
        let events = Events::default();
        let mut ctx = context(temp.path(), "23.2.0.2365128", &events);

        ctx.init_sdk(&VersionRequest::parse("23.2"), true)
            .await
            .expect("Should install then set up R2023b");

        assert!(temp.path().join("R2023b").join(LICENSE_MARKER).is_file());
        assert_eq!(ctx.installer().fetcher().downloads.borrow().len(), 1);
        assert_eq!(events.all(), ["load R2023b"]);
    }

    #[tokio::test]
    async fn loaded_runtime_of_another_release_is_version_mismatch() {
        let temp = tempfile::tempdir().unwrap();
        mark_installed(temp.path(), "R2022b");
        let events = Events::default();
        let mut ctx = context(temp.path(), "9.12.0.1884302", &events);

        let err = ctx
            .init_sdk(&VersionRequest::parse("R2022b"), false)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::VersionMismatch { .. }));
        assert_eq!(
            err.to_string(),
            "runtime version of package (9.13) does not match \
             runtime version of previously loaded package (9.12)"
        );
        assert_eq!(ctx.state(), LifecycleState::Uninitialized);
    }

    #[test]
    fn version_check_compares_major_minor_only() {
        let release = Release::normalize("R2015aSP1").unwrap();
        assert!(check_version(&release, "8.5.0.197613").is_ok());
        let release = Release::normalize("R2023b").unwrap();
        assert!(check_version(&release, "23.2.0.2365128").is_ok());
        assert!(check_version(&release, "24.1").is_err());
    }

    #[tokio::test]
    async fn init_runtime_sets_up_sdk_and_refuses_second_start() {
        let temp = tempfile::tempdir().unwrap();
        mark_installed(temp.path(), "R2022b");
        let events = Events::default();
        let mut ctx = context(temp.path(), "9.13", &events);

        ctx.init_runtime(&["-nojvm".to_string()])
            .await
            .expect("Should start the runtime");
        assert_eq!(ctx.state(), LifecycleState::RuntimeReady);

        let err = ctx.init_runtime(&[]).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyInitialized { what: "MATLAB runtime" }));

        ctx.terminate_runtime().expect("Should terminate");
        assert_eq!(ctx.state(), LifecycleState::Terminated);
        ctx.init_runtime(&[]).await.expect("Should restart");

        assert_eq!(
            events.all(),
            [
                "load R2022b",
                "initialize_application -nojvm",
                "terminate_application",
                "initialize_application",
            ]
        );
    }

    #[tokio::test]
    async fn terminate_runtime_is_noop_when_not_running() {
        let temp = tempfile::tempdir().unwrap();
        let events = Events::default();
        let mut ctx = context(temp.path(), "9.13", &events);

        ctx.terminate_runtime().expect("Should do nothing");
        assert_eq!(ctx.state(), LifecycleState::Uninitialized);
        drop(ctx);
        assert!(events.all().is_empty());
    }

    #[tokio::test]
    async fn import_deployed_returns_cached_live_handle() {
        let temp = tempfile::tempdir().unwrap();
        mark_installed(temp.path(), "R2022b");
        let events = Events::default();
        let mut ctx = context(temp.path(), "9.13", &events);

        let first = ctx.import_deployed(&package("magic")).await.unwrap();
        let second = ctx.import_deployed(&package("magic")).await.unwrap();

        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(events.count("open magic"), 1);
        assert_eq!(events.count("initialize magic"), 1);
        assert_eq!(events.count("initialize_application"), 1);
    }

    #[tokio::test]
    async fn dropped_handle_is_terminated_and_reopened_on_next_import() {
        let temp = tempfile::tempdir().unwrap();
        mark_installed(temp.path(), "R2022b");
        let events = Events::default();
        let mut ctx = context(temp.path(), "9.13", &events);

        let handle = ctx.import_deployed(&package("magic")).await.unwrap();
        drop(handle);
        assert_eq!(events.count("terminate magic"), 1);

        let handle = ctx.import_deployed(&package("magic")).await.unwrap();
        assert!(handle.is_open());
        assert_eq!(events.count("initialize magic"), 2);
    }

    #[tokio::test]
    async fn closed_handle_is_not_reused() {
        let temp = tempfile::tempdir().unwrap();
        mark_installed(temp.path(), "R2022b");
        let events = Events::default();
        let mut ctx = context(temp.path(), "9.13", &events);

        let first = ctx.import_deployed(&package("magic")).await.unwrap();
        first.close().unwrap();
        first.close().unwrap();
        assert!(!first.is_open());

        let second = ctx.import_deployed(&package("magic")).await.unwrap();
        assert!(!Rc::ptr_eq(&first, &second));
        assert_eq!(events.count("terminate magic"), 1);
    }

    #[tokio::test]
    async fn import_deployed_many_keeps_order() {
        let temp = tempfile::tempdir().unwrap();
        mark_installed(temp.path(), "R2022b");
        let events = Events::default();
        let mut ctx = context(temp.path(), "9.13", &events);

        let handles = ctx
            .import_deployed_many(&[package("alpha"), package("beta")])
            .await
            .unwrap();

        let names: Vec<_> = handles.iter().map(|h| h.package().name()).collect();
        assert_eq!(names, ["alpha", "beta"]);
    }

    #[tokio::test]
    async fn shutdown_terminates_packages_before_runtime() {
        let temp = tempfile::tempdir().unwrap();
        mark_installed(temp.path(), "R2022b");
        let events = Events::default();
        let mut ctx = context(temp.path(), "9.13", &events);

        let kept = ctx.import_deployed(&package("alpha")).await.unwrap();
        let _beta = ctx.import_deployed(&package("beta")).await.unwrap();
        drop(ctx);

        let all = events.all();
        let last_package = all
            .iter()
            .rposition(|e| e.starts_with("terminate "))
            .unwrap();
        assert_eq!(all.last().map(String::as_str), Some("terminate_application"));
        assert!(last_package < all.len() - 1);
        assert_eq!(events.count("terminate alpha"), 1);
        assert_eq!(events.count("terminate beta"), 1);

        assert!(!kept.is_open());
        drop(kept);
        assert_eq!(events.count("terminate alpha"), 1);
    }

    /// Log sink shared with a `tracing` subscriber.
    #[derive(Clone, Default)]
    struct CapturedLogs(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn launch_only_options_are_picked_out() {
        let options = ["-nojvm", "-singleCompThread", "-nodisplay"].map(String::from);
        assert_eq!(launch_only_options(&options), ["-nojvm", "-nodisplay"]);
        assert!(launch_only_options(&["-logfile".to_string()]).is_empty());
    }

    #[tokio::test]
    async fn macos_warns_about_launch_only_options_but_starts() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let temp = tempfile::tempdir().unwrap();
        mark_installed(temp.path(), "R2023b");
        let events = Events::default();
        let mut ctx = context_on(Platform::Maca64, temp.path(), "23.2", &events);

        ctx.init_runtime(&["-nodisplay".to_string()])
            .await
            .expect("Ignored options are not an error");

        assert_eq!(ctx.state(), LifecycleState::RuntimeReady);
        assert!(events.all().contains(&"initialize_application -nodisplay".to_string()));
        let text = logs.text();
        assert!(text.contains("WARN"), "{text}");
        assert!(text.contains("ignored on macOS"), "{text}");
    }

    #[tokio::test]
    async fn linux_does_not_warn_about_launch_options() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let temp = tempfile::tempdir().unwrap();
        mark_installed(temp.path(), "R2022b");
        let events = Events::default();
        let mut ctx = context(temp.path(), "9.13", &events);

        ctx.init_runtime(&["-nojvm".to_string()]).await.unwrap();

        assert!(!logs.text().contains("ignored on macOS"));
    }

    #[cfg(target_os = "linux")]
    mod loaded_runtime {
        use super::*;
        use crate::native::{MclBackend, VERSION_INFO_FILE, loaded_runtime};
        use serial_test::serial;

        /// A shared library every Linux system has, standing in for the
        /// runtime's C API library. Nothing in it is called.
        fn system_library() -> Option<std::path::PathBuf> {
            [
                "/lib/x86_64-linux-gnu/libm.so.6",
                "/usr/lib/x86_64-linux-gnu/libm.so.6",
                "/lib/aarch64-linux-gnu/libm.so.6",
                "/usr/lib/aarch64-linux-gnu/libm.so.6",
                "/lib64/libm.so.6",
                "/usr/lib64/libm.so.6",
                "/usr/lib/libm.so.6",
                "/lib/libm.so.6",
            ]
            .iter()
            .map(std::path::PathBuf::from)
            .find(|path| path.is_file())
        }

        fn runtime_install(prefix: &Path, release: &str, version: &str, library: &Path) {
            mark_installed(prefix, release);
            let root = prefix.join(release);
            std::fs::write(
                root.join(VERSION_INFO_FILE),
                format!("<version>{version}</version>"),
            )
            .unwrap();
            let dir = root.join("extern").join("bin").join("glnxa64");
            std::fs::create_dir_all(&dir).unwrap();
            std::os::unix::fs::symlink(library, dir.join("libmwmclmcrrt.so")).unwrap();
        }

        fn mcl_context(prefix: &Path) -> RuntimeContext<MclBackend, ArchiveFetcher> {
            let installer = Installer::new(
                Platform::Glnxa64,
                InstallPaths::new(prefix),
                ConfirmationGate::new(true, Cursor::new(""), std::io::sink()),
                InstallerResolver::with_year(Catalog::new(BASE), 2030),
                ArchiveFetcher::new(Vec::new()),
            );
            RuntimeContext::new(installer, MclBackend::new())
        }

        #[tokio::test]
        #[serial(loaded_runtime)]
        async fn second_release_in_same_process_is_version_mismatch() {
            let Some(library) = system_library() else {
                return;
            };
            let temp = tempfile::tempdir().unwrap();
            runtime_install(temp.path(), "R2022b", "9.13.0.2049777", &library);
            runtime_install(temp.path(), "R2021a", "9.10.0.1602886", &library);

            let mut first = mcl_context(temp.path());
            first
                .init_sdk(&VersionRequest::parse("R2022b"), false)
                .await
                .expect("Should load the R2022b runtime");
            assert_eq!(loaded_runtime().map(|(_, v)| v), Some("9.13.0.2049777"));

            let mut second = mcl_context(temp.path());
            let err = second
                .init_sdk(&VersionRequest::parse("R2021a"), false)
                .await
                .unwrap_err();

            assert!(matches!(
                err,
                Error::VersionMismatch { ref expected, ref loaded }
                    if expected == "9.10" && loaded == "9.13"
            ));
            assert_eq!(second.state(), LifecycleState::Uninitialized);

            let mut third = mcl_context(temp.path());
            third
                .init_sdk(&VersionRequest::parse("R2022b"), false)
                .await
                .expect("The release already in the process loads again");
        }
    }
}
