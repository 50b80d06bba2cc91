//! Platform detection for MATLAB Runtime installers.
//!
//! MathWorks publishes one runtime build per platform tag. This module maps
//! the running operating system and CPU to that tag.
//!
//! ## Supported Platforms
//!
//! | Tag       | OS      | CPU                 |
//! |-----------|---------|---------------------|
//! | `win32`   | Windows | 32-bit              |
//! | `win64`   | Windows | 64-bit              |
//! | `glnx86`  | Linux   | 32-bit              |
//! | `glnxa64` | Linux   | 64-bit              |
//! | `maci64`  | macOS   | Intel 64-bit        |
//! | `maca64`  | macOS   | Apple Silicon       |

use std::fmt;
use std::process::Command;
use std::str::FromStr;

use serde::Serialize;

use crate::errors::{Error, Result};

/// Represents a platform tag used in MATLAB Runtime download URLs and
/// install layouts (`bin/<tag>`, `extern/bin/<tag>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "&'static str")]
pub enum Platform {
    /// Windows, 32-bit
    Win32,
    /// Windows, 64-bit
    Win64,
    /// Linux, 32-bit
    Glnx86,
    /// Linux, 64-bit
    Glnxa64,
    /// macOS on Intel
    Maci64,
    /// macOS on Apple Silicon
    Maca64,
}

impl Platform {
    /// All platform tags, in catalog order.
    pub const ALL: [Platform; 6] = [
        Self::Win64,
        Self::Win32,
        Self::Glnxa64,
        Self::Glnx86,
        Self::Maci64,
        Self::Maca64,
    ];

    /// Detects the platform of the running process.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedPlatform`] if the OS is not Windows,
    /// Linux or macOS.
    pub fn detect() -> Result<Self> {
        let pointer_width = if cfg!(target_pointer_width = "64") {
            64
        } else {
            32
        };
        Self::from_os_arch(std::env::consts::OS, pointer_width, std::env::consts::ARCH)
    }

    /// Maps an OS name, pointer width and CPU architecture to a platform tag.
    ///
    /// The OS name selects the family (`win`, `glnx`, `mac`). Windows and
    /// Linux append the bit width; macOS appends the CPU family (`a` for ARM,
    /// `i` for Intel) followed by `64`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedPlatform`] for any other OS name.
    pub fn from_os_arch(os: &str, pointer_width: u32, arch: &str) -> Result<Self> {
        let is_64 = pointer_width > 32;
        match os {
            "windows" => Ok(if is_64 { Self::Win64 } else { Self::Win32 }),
            "linux" => Ok(if is_64 { Self::Glnxa64 } else { Self::Glnx86 }),
            "macos" => Ok(if arch.starts_with("aarch64") || arch.starts_with("arm") {
                Self::Maca64
            } else {
                Self::Maci64
            }),
            _ => Err(Error::unsupported_platform(os, arch)),
        }
    }

    /// Returns the tag used in download URLs and install directories.
    #[must_use = "returns the platform tag without side effects"]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Win32 => "win32",
            Self::Win64 => "win64",
            Self::Glnx86 => "glnx86",
            Self::Glnxa64 => "glnxa64",
            Self::Maci64 => "maci64",
            Self::Maca64 => "maca64",
        }
    }

    /// Returns whether this platform is Windows.
    #[must_use = "returns platform check result without side effects"]
    pub fn is_windows(self) -> bool {
        matches!(self, Self::Win32 | Self::Win64)
    }

    /// Returns whether this platform is Linux.
    #[must_use = "returns platform check result without side effects"]
    pub fn is_linux(self) -> bool {
        matches!(self, Self::Glnx86 | Self::Glnxa64)
    }

    /// Returns whether this platform is macOS.
    #[must_use = "returns platform check result without side effects"]
    pub fn is_macos(self) -> bool {
        matches!(self, Self::Maci64 | Self::Maca64)
    }

    /// Returns the file name of the vendor installer found at the root of an
    /// extracted installer archive.
    #[must_use = "returns the file name without side effects"]
    pub fn installer_name(self) -> &'static str {
        if self.is_windows() {
            "setup.exe"
        } else {
            "install"
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<Platform> for &'static str {
    fn from(platform: Platform) -> Self {
        platform.as_str()
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::unsupported_platform(s, "unknown"))
    }
}

/// Returns the `(major, minor)` version of the running macOS.
///
/// Used to decide whether downloaded installer binaries must have their
/// quarantine attribute removed before they can run.
///
/// # Errors
///
/// Returns an error if `sw_vers` cannot be run or prints something that is
/// not a dotted version.
pub fn macos_version() -> Result<(u32, u32)> {
    let output = Command::new("sw_vers")
        .arg("-productVersion")
        .output()
        .map_err(|e| Error::io("Failed to run sw_vers", e))?;
    let text = String::from_utf8_lossy(&output.stdout);
    parse_os_version(&text).ok_or_else(|| Error::invalid_version(text.trim()))
}

/// Parses `"14.2.1"` into `(14, 2)`. A missing minor component reads as 0.
#[must_use]
pub fn parse_os_version(text: &str) -> Option<(u32, u32)> {
    let mut parts = text.trim().split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = match parts.next() {
        Some(minor) => minor.parse().ok()?,
        None => 0,
    };
    Some((major, minor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_appends_bit_width() {
        assert_eq!(
            Platform::from_os_arch("windows", 64, "x86_64").unwrap(),
            Platform::Win64
        );
        assert_eq!(
            Platform::from_os_arch("windows", 32, "x86").unwrap(),
            Platform::Win32
        );
    }

    #[test]
    fn linux_appends_bit_width() {
        assert_eq!(
            Platform::from_os_arch("linux", 64, "x86_64").unwrap(),
            Platform::Glnxa64
        );
        assert_eq!(
            Platform::from_os_arch("linux", 32, "x86").unwrap(),
            Platform::Glnx86
        );
    }

    #[test]
    fn macos_uses_cpu_family() {
        assert_eq!(
            Platform::from_os_arch("macos", 64, "aarch64").unwrap(),
            Platform::Maca64
        );
        assert_eq!(
            Platform::from_os_arch("macos", 64, "x86_64").unwrap(),
            Platform::Maci64
        );
    }

    #[test]
    fn unknown_os_is_unsupported() {
        for os in ["freebsd", "android", "ios", ""] {
            let err = Platform::from_os_arch(os, 64, "x86_64").unwrap_err();
            assert!(matches!(err, Error::UnsupportedPlatform { .. }), "{os}");
        }
    }

    #[test]
    fn each_tag_belongs_to_exactly_one_family() {
        for platform in Platform::ALL {
            let families = [
                platform.is_windows(),
                platform.is_linux(),
                platform.is_macos(),
            ];
            assert_eq!(families.iter().filter(|f| **f).count(), 1, "{platform}");
        }
    }

    #[test]
    fn tags_round_trip_through_from_str() {
        for platform in Platform::ALL {
            assert_eq!(platform.as_str().parse::<Platform>().unwrap(), platform);
        }
        assert!("glnx64".parse::<Platform>().is_err());
    }

    #[test]
    fn installer_name_depends_on_family() {
        assert_eq!(Platform::Win64.installer_name(), "setup.exe");
        assert_eq!(Platform::Glnxa64.installer_name(), "install");
        assert_eq!(Platform::Maca64.installer_name(), "install");
    }

    #[test]
    fn detect_returns_platform_on_supported_system() {
        let result = Platform::detect();
        #[cfg(all(target_os = "linux", target_pointer_width = "64"))]
        assert!(matches!(result, Ok(Platform::Glnxa64)));

        #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
        assert!(matches!(result, Ok(Platform::Maca64)));

        #[cfg(all(target_os = "windows", target_pointer_width = "64"))]
        assert!(matches!(result, Ok(Platform::Win64)));

        let _ = result;
    }

    #[test]
    fn parse_os_version_reads_major_minor() {
        assert_eq!(parse_os_version("14.2.1\n"), Some((14, 2)));
        assert_eq!(parse_os_version("10.15"), Some((10, 15)));
        assert_eq!(parse_os_version("11"), Some((11, 0)));
        assert_eq!(parse_os_version("ProductVersion"), None);
    }

    #[test]
    fn quarantine_threshold_compares_as_tuples() {
        assert!(parse_os_version("10.15.7").unwrap() > (10, 14));
        assert!(parse_os_version("10.14.6").unwrap() <= (10, 14));
    }
}
