#![warn(clippy::pedantic)]

//! Install, locate and initialize the MATLAB Runtime.
//!
//! This crate manages the lifecycle of the MathWorks MATLAB Runtime on the
//! local machine: resolving which release and platform build to fetch,
//! downloading and unpacking the vendor installer, running it unattended,
//! removing installs, and loading the runtime so that packages built with
//! MATLAB Compiler SDK can be used from the current process.
//!
//! ## Components
//!
//! - [`platform`]: maps the running OS and CPU to a platform tag
//! - [`catalog`]: static table of releases and installer URLs
//! - [`resolver`]: "latest" resolution and probing for unlisted releases
//! - [`fetch`]: HTTP existence checks and downloads
//! - [`archive`]: ZIP extraction that keeps permissions and symlinks
//! - [`confirm`]: yes/no confirmation before destructive steps
//! - [`paths`]: install prefix layout
//! - [`installer`]: install and uninstall orchestration
//! - [`native`]: `libloading` bindings to the runtime's C API
//! - [`runtime`]: the per-process runtime context
//!
//! ## Example
//!
//! ```no_run
//! use matlab_runtime::{
//!     Catalog, ConfirmationGate, HttpFetcher, InstallPaths, Installer, InstallerResolver,
//!     Platform, VersionRequest,
//! };
//!
//! # async fn run() -> matlab_runtime::Result<()> {
//! let platform = Platform::detect()?;
//! let mut installer = Installer::new(
//!     platform,
//!     InstallPaths::from_env(platform),
//!     ConfirmationGate::stdio(false),
//!     InstallerResolver::new(Catalog::from_env()),
//!     HttpFetcher::new()?,
//! );
//! installer.install(&VersionRequest::parse("R2022b")).await?;
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod catalog;
pub mod confirm;
pub mod errors;
pub mod fetch;
pub mod installer;
pub mod native;
pub mod paths;
pub mod platform;
pub mod resolver;
pub mod runtime;

pub use catalog::{Catalog, Release};
pub use confirm::{Answer, ConfirmationGate};
pub use errors::{Error, Result};
pub use fetch::{Fetch, HttpFetcher};
pub use installer::Installer;
pub use native::{DeployedPackage, MclBackend, PackageBackend, RuntimeBackend, SearchPath};
pub use paths::{InstallPaths, LICENSE_MARKER};
pub use platform::Platform;
pub use resolver::{InstallerResolver, VersionRequest};
pub use runtime::{DeployedHandle, Handle, LifecycleState, RuntimeContext};
