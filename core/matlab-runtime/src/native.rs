//! Native MATLAB Runtime bindings.
//!
//! The runtime and the packages built with MATLAB Compiler SDK are plain C
//! shared libraries. [`RuntimeBackend`] and [`PackageBackend`] are the seams
//! the [`crate::RuntimeContext`] drives; [`MclBackend`] implements them with
//! `libloading`.
//!
//! ## Entry points
//!
//! | Library                   | Symbol                             | C signature                             |
//! |---------------------------|------------------------------------|-----------------------------------------|
//! | `mclmcrrt` (runtime)      | `mclInitializeApplication_proxy`   | `bool (const char **options, size_t n)` |
//! | `mclmcrrt` (runtime)      | `mclTerminateApplication_proxy`    | `bool (void)`                           |
//! | deployed package `<name>` | `<name>Initialize`                 | `bool (void)`                           |
//! | deployed package `<name>` | `<name>Terminate`                  | `void (void)`                           |
//!
//! Libraries are opened by absolute path. The dynamic loader's own search
//! path cannot be changed once the process runs, so the runtime's dependent
//! libraries still have to be reachable through `LD_LIBRARY_PATH`
//! (Linux), `DYLD_LIBRARY_PATH` (macOS) or `PATH` (Windows, updated by
//! [`crate::RuntimeContext::init_sdk`]).

use std::ffi::{CString, c_char};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use libloading::{Library, Symbol};

use crate::errors::{Error, IoContext, Result};

/// File at the root of every runtime install that records its version.
pub const VERSION_INFO_FILE: &str = "VersionInfo.xml";

/// Ordered list of directories searched for native libraries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    /// Creates an empty search path.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts `dirs` in front of the current entries, keeping their order.
    pub fn prepend<I>(&mut self, dirs: I)
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut front: Vec<PathBuf> = dirs.into_iter().collect();
        front.append(&mut self.dirs);
        self.dirs = front;
    }

    /// Returns the directories, highest priority first.
    #[must_use]
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Returns the first file in the search path whose name is `stem`
    /// followed by the platform's shared library suffix (and, on Unix, an
    /// optional version: `libmwmclmcrrt.so.9.13`).
    #[must_use]
    pub fn find_library(&self, stem: &str) -> Option<PathBuf> {
        let exact = format!("{stem}{}", std::env::consts::DLL_SUFFIX);
        let versioned = format!("{exact}.");
        self.dirs.iter().find_map(|dir| {
            let candidate = dir.join(&exact);
            if candidate.is_file() {
                return Some(candidate);
            }
            let mut matches: Vec<PathBuf> = fs::read_dir(dir)
                .ok()?
                .filter_map(std::result::Result::ok)
                .map(|entry| entry.path())
                .filter(|path| {
                    path.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with(&versioned))
                })
                .collect();
            matches.sort();
            matches.pop()
        })
    }
}

/// A package compiled with MATLAB Compiler SDK.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeployedPackage {
    name: String,
    library: PathBuf,
}

impl DeployedPackage {
    /// Describes a package by name and shared library path.
    #[must_use]
    pub fn new(name: impl Into<String>, library: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            library: library.into(),
        }
    }

    /// Describes a package by its shared library, taking the name from the
    /// file stem (`libmypkg.so` and `mypkg.dll` are both `mypkg`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NativeLibrary`] if the path has no usable file stem.
    pub fn from_library(library: impl Into<PathBuf>) -> Result<Self> {
        let library = library.into();
        let stem = library
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.split('.').next())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                Error::native(format!("Cannot derive package name from {}", library.display()))
            })?;
        let name = if cfg!(windows) {
            stem
        } else {
            stem.strip_prefix("lib").unwrap_or(stem)
        };
        Ok(Self::new(name.to_string(), library))
    }

    /// Returns the package name, which prefixes its entry points.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the shared library path.
    #[must_use]
    pub fn library(&self) -> &Path {
        &self.library
    }
}

/// One loaded deployed package.
pub trait PackageBackend {
    /// Initializes the package against the running runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NativeLibrary`] if the package reports failure.
    fn initialize(&mut self) -> Result<()>;

    /// Releases the package's runtime resources.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NativeLibrary`] if the entry point cannot be called.
    fn terminate(&mut self) -> Result<()>;
}

/// The vendor runtime, loaded once per process.
pub trait RuntimeBackend {
    /// Handle type of deployed packages opened through this backend.
    type Package: PackageBackend;

    /// Loads the runtime from the given release root and search path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NativeLibrary`] if the runtime library cannot be
    /// found or loaded.
    fn load(&mut self, release_root: &Path, search_path: &SearchPath) -> Result<()>;

    /// Returns the dotted version of the runtime that was actually loaded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] before [`RuntimeBackend::load`].
    fn version(&self) -> Result<String>;

    /// Starts the runtime with MATLAB command-line style options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NativeLibrary`] if the runtime reports failure.
    fn initialize_application(&mut self, options: &[String]) -> Result<()>;

    /// Stops the runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NativeLibrary`] if the runtime reports failure.
    fn terminate_application(&mut self) -> Result<()>;

    /// Loads a deployed package without initializing it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NativeLibrary`] if the library or its entry points
    /// cannot be loaded.
    fn open_package(&mut self, package: &DeployedPackage) -> Result<Self::Package>;
}

/// Extracts the `<version>` element of a `VersionInfo.xml` document.
#[must_use]
pub fn parse_version_info(xml: &str) -> Option<&str> {
    let start = xml.find("<version>")? + "<version>".len();
    let end = start + xml[start..].find("</version>")?;
    Some(xml[start..end].trim()).filter(|v| !v.is_empty())
}

/// Returns `major.minor` of a dotted version.
#[must_use]
pub fn major_minor(version: &str) -> Option<(u32, u32)> {
    let mut parts = version.trim().split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().unwrap_or("0").parse().ok()?;
    Some((major, minor))
}

/// Finds the install root of a library by walking up to `VersionInfo.xml`.
fn version_root(library: &Path) -> Option<&Path> {
    library
        .ancestors()
        .skip(1)
        .find(|dir| dir.join(VERSION_INFO_FILE).is_file())
}

/// The first runtime library loaded into this process and its version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LoadedRuntime {
    pub(crate) library: PathBuf,
    pub(crate) version: String,
}

/// Native code cannot be unloaded, so once a runtime is in the process every
/// later load resolves to it, whichever release was asked for.
static LOADED_RUNTIME: OnceLock<LoadedRuntime> = OnceLock::new();

/// Returns the runtime library already loaded into this process, if any.
#[must_use]
pub fn loaded_runtime() -> Option<(&'static Path, &'static str)> {
    LOADED_RUNTIME
        .get()
        .map(|runtime| (runtime.library.as_path(), runtime.version.as_str()))
}

/// Decides which runtime a load ends up with: the one already in the
/// process, or `found` with the version recorded next to it.
pub(crate) fn runtime_to_load(
    loaded: Option<&LoadedRuntime>,
    found: PathBuf,
    release_root: &Path,
) -> Result<LoadedRuntime> {
    if let Some(loaded) = loaded {
        if loaded.library != found {
            tracing::warn!(
                requested = %found.display(),
                loaded = %loaded.library.display(),
                version = %loaded.version,
                "another MATLAB runtime is already loaded in this process"
            );
        }
        return Ok(loaded.clone());
    }

    // The version is read from the install the library belongs to, which
    // is not necessarily `release_root` if another runtime shadows it.
    let root = version_root(&found).unwrap_or(release_root);
    let info = root.join(VERSION_INFO_FILE);
    let xml =
        fs::read_to_string(&info).io_context(|| format!("Failed to read {}", info.display()))?;
    let version = parse_version_info(&xml)
        .ok_or_else(|| Error::native(format!("No <version> in {}", info.display())))?
        .to_string();
    Ok(LoadedRuntime {
        library: found,
        version,
    })
}

/// Stem of the runtime's C API library.
#[cfg(windows)]
pub const RUNTIME_LIBRARY: &str = "mclmcrrt";
/// Stem of the runtime's C API library.
#[cfg(not(windows))]
pub const RUNTIME_LIBRARY: &str = "libmwmclmcrrt";

type InitializeApplicationFn = unsafe extern "C" fn(*const *const c_char, usize) -> bool;
type TerminateApplicationFn = unsafe extern "C" fn() -> bool;
type PackageInitializeFn = unsafe extern "C" fn() -> bool;
type PackageTerminateFn = unsafe extern "C" fn();

/// `libloading` implementation of [`RuntimeBackend`].
#[derive(Debug, Default)]
pub struct MclBackend {
    library: Option<Library>,
    library_path: Option<PathBuf>,
    version: Option<String>,
}

impl MclBackend {
    /// Creates an unloaded backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the path of the loaded runtime library.
    #[must_use]
    pub fn library_path(&self) -> Option<&Path> {
        self.library_path.as_deref()
    }

    fn library(&self) -> Result<&Library> {
        self.library
            .as_ref()
            .ok_or(Error::not_initialized("MATLAB SDK"))
    }

    /// Resolves the first of `names` exported by the runtime library.
    fn symbol<T>(&self, names: &[&str]) -> Result<Symbol<'_, T>> {
        let library = self.library()?;
        let mut last = None;
        for name in names {
            // SAFETY: the caller's `T` matches the C signature documented in
            // the module table.
            match unsafe { library.get::<T>(name.as_bytes()) } {
                Ok(symbol) => return Ok(symbol),
                Err(e) => last = Some(e),
            }
        }
        let message = format!("Runtime library exports none of {names:?}");
        Err(match last {
            Some(e) => Error::native_with_source(message, e),
            None => Error::native(message),
        })
    }
}

impl RuntimeBackend for MclBackend {
    type Package = MclPackage;

    fn load(&mut self, release_root: &Path, search_path: &SearchPath) -> Result<()> {
        let found = search_path.find_library(RUNTIME_LIBRARY).ok_or_else(|| {
            Error::native(format!(
                "{RUNTIME_LIBRARY} not found in {:?}",
                search_path.dirs()
            ))
        })?;
        let runtime = runtime_to_load(LOADED_RUNTIME.get(), found, release_root)?;

        // SAFETY: loading the vendor runtime runs its static initializers,
        // which are trusted to be sound.
        let library = unsafe { Library::new(&runtime.library) }.map_err(|e| {
            Error::native_with_source(format!("Failed to load {}", runtime.library.display()), e)
        })?;

        let runtime = LOADED_RUNTIME.get_or_init(|| runtime).clone();
        tracing::info!(
            library = %runtime.library.display(),
            version = %runtime.version,
            "loaded MATLAB runtime library"
        );
        self.library = Some(library);
        self.library_path = Some(runtime.library);
        self.version = Some(runtime.version);
        Ok(())
    }

    fn version(&self) -> Result<String> {
        self.version
            .clone()
            .ok_or(Error::not_initialized("MATLAB SDK"))
    }

    fn initialize_application(&mut self, options: &[String]) -> Result<()> {
        let options = options
            .iter()
            .map(|o| CString::new(o.as_str()))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::native(format!("Invalid runtime option: {e}")))?;
        let pointers: Vec<*const c_char> = options.iter().map(|o| o.as_ptr()).collect();

        let initialize: Symbol<'_, InitializeApplicationFn> =
            self.symbol(&["mclInitializeApplication_proxy", "mclInitializeApplication"])?;
        // SAFETY: `pointers` holds `options.len()` valid C strings that live
        // until the call returns.
        let ok = unsafe { initialize(pointers.as_ptr(), pointers.len()) };
        if ok {
            Ok(())
        } else {
            Err(Error::native("mclInitializeApplication failed"))
        }
    }

    fn terminate_application(&mut self) -> Result<()> {
        let terminate: Symbol<'_, TerminateApplicationFn> =
            self.symbol(&["mclTerminateApplication_proxy", "mclTerminateApplication"])?;
        // SAFETY: takes no arguments; only called after initialization.
        if unsafe { terminate() } {
            Ok(())
        } else {
            Err(Error::native("mclTerminateApplication failed"))
        }
    }

    fn open_package(&mut self, package: &DeployedPackage) -> Result<MclPackage> {
        // SAFETY: deployed packages are generated by MATLAB Compiler SDK and
        // only link against the runtime loaded above.
        let library = unsafe { Library::new(package.library()) }.map_err(|e| {
            Error::native_with_source(
                format!("Failed to load {}", package.library().display()),
                e,
            )
        })?;
        let package = MclPackage {
            initialize_symbol: format!("{}Initialize", package.name()),
            terminate_symbol: format!("{}Terminate", package.name()),
            library,
        };
        // Fail early rather than at first use if the entry points are missing.
        package.check_symbols()?;
        Ok(package)
    }
}

/// A deployed package loaded with `libloading`.
#[derive(Debug)]
pub struct MclPackage {
    library: Library,
    initialize_symbol: String,
    terminate_symbol: String,
}

impl MclPackage {
    fn check_symbols(&self) -> Result<()> {
        for name in [&self.initialize_symbol, &self.terminate_symbol] {
            // SAFETY: only the symbol address is looked up, nothing is called.
            unsafe { self.library.get::<*const ()>(name.as_bytes()) }
                .map_err(|e| Error::native_with_source(format!("Missing symbol {name}"), e))?;
        }
        Ok(())
    }
}

impl PackageBackend for MclPackage {
    fn initialize(&mut self) -> Result<()> {
        // SAFETY: signature generated by MATLAB Compiler SDK.
        let initialize: Symbol<'_, PackageInitializeFn> =
            unsafe { self.library.get(self.initialize_symbol.as_bytes()) }.map_err(|e| {
                Error::native_with_source(format!("Missing symbol {}", self.initialize_symbol), e)
            })?;
        // SAFETY: the runtime is initialized before packages are opened.
        if unsafe { initialize() } {
            Ok(())
        } else {
            Err(Error::native(format!("{} failed", self.initialize_symbol)))
        }
    }

    fn terminate(&mut self) -> Result<()> {
        // SAFETY: signature generated by MATLAB Compiler SDK.
        let terminate: Symbol<'_, PackageTerminateFn> =
            unsafe { self.library.get(self.terminate_symbol.as_bytes()) }.map_err(|e| {
                Error::native_with_source(format!("Missing symbol {}", self.terminate_symbol), e)
            })?;
        // SAFETY: only called once per successful initialize.
        unsafe { terminate() };
        Ok(())
    }
}
