//! Static catalog of MATLAB Runtime releases and installer URLs.
//!
//! The catalog is built once from two URL templates:
//!
//! - the **update** template, used from R2019a onwards, which embeds the
//!   release's update number:
//!   `{base}/{version}/Release/{update}/deployment_files/installer/complete/{arch}/MATLAB_Runtime_{version}_Update_{update}_{arch}.{ext}`
//! - the **legacy** template, used before R2019a:
//!   `{base}/{version}/deployment_files/{version}/installers/{arch}/MCR_{version}_{arch}_installer.{ext}`
//!
//! MathWorks links macOS downloads to `.dmg` files (or zips wrapping a dmg).
//! Asking for `.zip` instead yields an archive with a command-line installer,
//! which is the only way to install unattended, so macOS always uses `.zip`.
//!
//! Releases that are not in the static table are discovered at runtime by
//! [`crate::resolver::InstallerResolver`], which keeps its own cache so that
//! the table here never changes after construction.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Serialize;

use crate::errors::{Error, Result};
use crate::platform::Platform;

/// Environment variable overriding the download host base URL.
pub const DIST_SERVER_ENV: &str = "MATLAB_RUNTIME_DIST_SERVER";

/// Default download host base URL.
pub const DEFAULT_DIST_SERVER: &str = "https://ssd.mathworks.com/supportfiles/downloads";

/// Highest update number tried when probing for an unknown release.
pub const MAX_PROBED_UPDATE: u32 = 10;

/// Runtime version numbers of releases before R2023b.
///
/// Starting with R2023b the runtime version scheme matches the MATLAB release
/// scheme (`23.2` is `R2023b`) and no table is needed.
const LEGACY_VERSIONS: [(&str, &str); 24] = [
    ("9.14", "R2023a"),
    ("9.13", "R2022b"),
    ("9.12", "R2022a"),
    ("9.11", "R2021b"),
    ("9.10", "R2021a"),
    ("9.9", "R2020b"),
    ("9.8", "R2020a"),
    ("9.7", "R2019b"),
    ("9.6", "R2019a"),
    ("9.5", "R2018b"),
    ("9.4", "R2018a"),
    ("9.3", "R2017b"),
    ("9.2", "R2017a"),
    ("9.1", "R2016b"),
    ("9.0.1", "R2016a"),
    ("9.0", "R2015b"),
    ("8.5.1", "R2015aSP1"),
    ("8.5", "R2015a"),
    ("8.4", "R2014b"),
    ("8.3", "R2014a"),
    ("8.2", "R2013b"),
    ("8.1", "R2013a"),
    ("8.0", "R2012b"),
    ("7.17", "R2012a"),
];

/// Update number of the published installer for each release that uses the
/// update template.
const RELEASE_UPDATES: [(&str, u32); 12] = [
    ("R2024b", 5),
    ("R2024a", 7),
    ("R2023b", 10),
    ("R2023a", 7),
    ("R2022b", 10),
    ("R2022a", 8),
    ("R2021b", 7),
    ("R2021a", 8),
    ("R2020b", 8),
    ("R2020a", 8),
    ("R2019b", 9),
    ("R2019a", 9),
];

/// Releases on Apple Silicon (the platform only exists from R2023b).
const MACA64_RELEASES: [&str; 3] = ["R2023b", "R2024a", "R2024b"];

/// A canonical MATLAB release label such as `R2022b`.
///
/// Labels order by recency: `R2015a < R2015aSP1 < R2015b < R2016a`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Release(String);

impl Release {
    /// Normalizes a release identifier.
    ///
    /// - Labels starting with `R` pass through unchanged.
    /// - Legacy runtime numbers (`9.13`) are looked up in the legacy table.
    /// - Any other `YY.N` number becomes `R20YY` followed by `a` for `N = 1`
    ///   or `b` for `N = 2`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidVersion`] if the identifier matches none of
    /// these forms.
    pub fn normalize(version: &str) -> Result<Self> {
        let version = version.trim();
        if version.starts_with('R') {
            return Ok(Self(version.to_string()));
        }
        if let Some((_, release)) = LEGACY_VERSIONS.iter().find(|(num, _)| *num == version) {
            return Ok(Self((*release).to_string()));
        }

        let invalid = || Error::invalid_version(version);
        let (year, part) = version.split_once('.').ok_or_else(invalid)?;
        if year.is_empty() || !year.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let letter = match part {
            "1" => 'a',
            "2" => 'b',
            _ => return Err(invalid()),
        };
        Ok(Self(format!("R20{year}{letter}")))
    }

    /// Builds the label for a calendar year and release letter.
    #[must_use]
    pub fn from_year(year: u32, letter: char) -> Self {
        Self(format!("R{year}{letter}"))
    }

    /// Returns the label as a string slice.
    #[must_use = "returns the label without side effects"]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the four-digit year of the release, if the label has one.
    #[must_use]
    pub fn year(&self) -> Option<u32> {
        self.0.get(1..5)?.parse().ok()
    }

    /// Returns the release letter (`a` or `b`), if the label has one.
    #[must_use]
    pub fn letter(&self) -> Option<char> {
        self.0.chars().nth(5)
    }

    /// Returns the runtime version number of this release (`R2022b` is
    /// `9.13`, `R2023b` is `23.2`).
    ///
    /// Returns `None` for labels that are neither in the legacy table nor a
    /// plain `RYYYYa`/`RYYYYb` release from 2023 onwards.
    #[must_use]
    pub fn numeric_version(&self) -> Option<String> {
        if let Some((num, _)) = LEGACY_VERSIONS.iter().find(|(_, rel)| *rel == self.0) {
            return Some((*num).to_string());
        }
        if self.0.len() != 6 {
            return None;
        }
        let year = self.year()?;
        let part = match self.letter()? {
            'a' => 1,
            'b' => 2,
            _ => return None,
        };
        (year >= 2023).then(|| format!("{}.{part}", year - 2000))
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Renders the update template (releases from R2019a on).
#[must_use]
pub fn update_installer_url(
    base: &str,
    release: &Release,
    update: u32,
    platform: Platform,
    ext: &str,
) -> String {
    format!(
        "{base}/{release}/Release/{update}/deployment_files/installer/complete/{platform}\
         /MATLAB_Runtime_{release}_Update_{update}_{platform}.{ext}"
    )
}

/// Renders the legacy template (releases before R2019a).
#[must_use]
pub fn legacy_installer_url(base: &str, release: &Release, platform: Platform, ext: &str) -> String {
    format!(
        "{base}/{release}/deployment_files/{release}/installers/{platform}\
         /MCR_{release}_{platform}_installer.{ext}"
    )
}

/// Returns the documented update number of a release, if it has one.
#[must_use]
pub fn release_update(release: &Release) -> Option<u32> {
    RELEASE_UPDATES
        .iter()
        .find(|(rel, _)| *rel == release.as_str())
        .map(|(_, update)| *update)
}

/// Immutable table of known installer URLs, keyed by platform and release.
#[derive(Debug, Clone)]
pub struct Catalog {
    base_url: String,
    entries: HashMap<Platform, BTreeMap<Release, String>>,
}

impl Catalog {
    /// Builds the catalog against the given download host base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let mut entries: HashMap<Platform, BTreeMap<Release, String>> = HashMap::new();

        let legacy_years = |last: u32| {
            (2012..=last).flat_map(|year| ['a', 'b'].map(|letter| Release::from_year(year, letter)))
        };

        let add_updates = |platform: Platform, table: &mut BTreeMap<Release, String>| {
            for (release, update) in RELEASE_UPDATES {
                let release = Release(release.to_string());
                let url = update_installer_url(&base_url, &release, update, platform, "zip");
                table.insert(release, url);
            }
        };

        // Windows 64-bit: zip from R2019a, self-extracting exe before.
        let mut win64 = BTreeMap::new();
        add_updates(Platform::Win64, &mut win64);
        for release in legacy_years(2018) {
            let url = legacy_installer_url(&base_url, &release, Platform::Win64, "exe");
            win64.insert(release, url);
        }

        // Linux 64-bit and macOS Intel: zip throughout.
        let mut glnxa64 = BTreeMap::new();
        let mut maci64 = BTreeMap::new();
        add_updates(Platform::Glnxa64, &mut glnxa64);
        add_updates(Platform::Maci64, &mut maci64);
        for release in legacy_years(2018) {
            let url = legacy_installer_url(&base_url, &release, Platform::Glnxa64, "zip");
            glnxa64.insert(release.clone(), url);
            let url = legacy_installer_url(&base_url, &release, Platform::Maci64, "zip");
            maci64.insert(release, url);
        }

        // 32-bit builds stopped early.
        let mut win32 = BTreeMap::new();
        for release in legacy_years(2015) {
            let url = legacy_installer_url(&base_url, &release, Platform::Win32, "exe");
            win32.insert(release, url);
        }
        let mut glnx86 = BTreeMap::new();
        let release = Release::from_year(2012, 'a');
        let url = legacy_installer_url(&base_url, &release, Platform::Glnx86, "zip");
        glnx86.insert(release, url);

        let mut maca64 = BTreeMap::new();
        for release in MACA64_RELEASES {
            let release = Release(release.to_string());
            if let Some(update) = release_update(&release) {
                let url = update_installer_url(&base_url, &release, update, Platform::Maca64, "zip");
                maca64.insert(release, url);
            }
        }

        entries.insert(Platform::Win64, win64);
        entries.insert(Platform::Win32, win32);
        entries.insert(Platform::Glnxa64, glnxa64);
        entries.insert(Platform::Glnx86, glnx86);
        entries.insert(Platform::Maci64, maci64);
        entries.insert(Platform::Maca64, maca64);

        Self { base_url, entries }
    }

    /// Builds the catalog against `MATLAB_RUNTIME_DIST_SERVER`, or the
    /// MathWorks download host when it is unset.
    #[must_use]
    pub fn from_env() -> Self {
        let base = std::env::var(DIST_SERVER_ENV)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DIST_SERVER.to_string());
        Self::new(base)
    }

    /// Returns the download host base URL.
    #[must_use = "returns the base URL without side effects"]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Looks up the installer URL of a release.
    #[must_use]
    pub fn get(&self, platform: Platform, release: &Release) -> Option<&str> {
        self.entries
            .get(&platform)
            .and_then(|table| table.get(release))
            .map(String::as_str)
    }

    /// Iterates known releases for a platform, oldest first.
    pub fn releases(&self, platform: Platform) -> impl Iterator<Item = (&Release, &str)> {
        self.entries
            .get(&platform)
            .into_iter()
            .flat_map(|table| table.iter().map(|(rel, url)| (rel, url.as_str())))
    }

    /// Returns the most recent release known for a platform.
    #[must_use]
    pub fn latest(&self, platform: Platform) -> Option<&Release> {
        self.entries
            .get(&platform)
            .and_then(|table| table.keys().next_back())
    }

    /// Candidate URLs for a release missing from the table, highest update
    /// number first.
    #[must_use]
    pub fn probe_candidates(&self, platform: Platform, release: &Release) -> Vec<String> {
        (0..=MAX_PROBED_UPDATE)
            .rev()
            .map(|update| update_installer_url(&self.base_url, release, update, platform, "zip"))
            .collect()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(DEFAULT_DIST_SERVER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(label: &str) -> Release {
        Release::normalize(label).expect("Should normalize")
    }

    #[test]
    fn legacy_numbers_map_to_release_labels() {
        assert_eq!(release("9.13").as_str(), "R2022b");
        assert_eq!(release("9.0.1").as_str(), "R2016a");
        assert_eq!(release("8.5.1").as_str(), "R2015aSP1");
        assert_eq!(release("7.17").as_str(), "R2012a");
    }

    #[test]
    fn new_scheme_numbers_are_translated() {
        assert_eq!(release("23.2").as_str(), "R2023b");
        assert_eq!(release("24.1").as_str(), "R2024a");
        assert_eq!(release("25.2").as_str(), "R2025b");
    }

    #[test]
    fn canonical_labels_pass_through() {
        for label in ["R2022b", "R2015aSP1", "R2099a"] {
            assert_eq!(release(label).as_str(), label);
        }
    }

    #[test]
    fn normalization_is_idempotent_over_legacy_table() {
        for (num, _) in LEGACY_VERSIONS {
            let once = release(num);
            let twice = release(once.as_str());
            assert_eq!(once, twice, "{num}");
        }
    }

    #[test]
    fn every_legacy_number_maps_to_a_distinct_label() {
        let mut labels: Vec<_> = LEGACY_VERSIONS.iter().map(|(_, rel)| *rel).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), LEGACY_VERSIONS.len());
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        for bad in ["latest", "24.3", "24", "x.1", "", "9.99.9"] {
            assert!(
                matches!(Release::normalize(bad), Err(Error::InvalidVersion { .. })),
                "{bad}"
            );
        }
    }

    #[test]
    fn numeric_version_inverts_normalization() {
        assert_eq!(release("R2022b").numeric_version().as_deref(), Some("9.13"));
        assert_eq!(release("R2015aSP1").numeric_version().as_deref(), Some("8.5.1"));
        assert_eq!(release("R2023b").numeric_version().as_deref(), Some("23.2"));
        assert_eq!(release("R2024a").numeric_version().as_deref(), Some("24.1"));
        assert_eq!(release("R2010a").numeric_version(), None);
        for (num, _) in LEGACY_VERSIONS {
            assert_eq!(release(num).numeric_version().as_deref(), Some(num));
        }
    }

    #[test]
    fn releases_order_by_recency() {
        let mut labels = vec![
            release("R2016a"),
            release("R2015b"),
            release("R2015aSP1"),
            release("R2015a"),
            release("R2024b"),
        ];
        labels.sort();
        let sorted: Vec<_> = labels.iter().map(Release::as_str).collect();
        assert_eq!(
            sorted,
            ["R2015a", "R2015aSP1", "R2015b", "R2016a", "R2024b"]
        );
    }

    #[test]
    fn update_template_is_used_from_r2019a() {
        let catalog = Catalog::default();
        assert_eq!(
            catalog.get(Platform::Glnxa64, &release("R2021a")),
            Some(
                "https://ssd.mathworks.com/supportfiles/downloads/R2021a/Release/8\
                 /deployment_files/installer/complete/glnxa64\
                 /MATLAB_Runtime_R2021a_Update_8_glnxa64.zip"
            )
        );
    }

    #[test]
    fn legacy_template_is_used_before_r2019a() {
        let catalog = Catalog::default();
        assert_eq!(
            catalog.get(Platform::Win64, &release("R2018b")),
            Some(
                "https://ssd.mathworks.com/supportfiles/downloads/R2018b\
                 /deployment_files/R2018b/installers/win64/MCR_R2018b_win64_installer.exe"
            )
        );
        assert_eq!(
            catalog
                .get(Platform::Glnxa64, &release("R2012a"))
                .map(|u| u.ends_with("MCR_R2012a_glnxa64_installer.zip")),
            Some(true)
        );
    }

    #[test]
    fn windows_post_cutover_uses_zip() {
        let catalog = Catalog::default();
        let url = catalog
            .get(Platform::Win64, &release("R2024b"))
            .expect("Should have R2024b");
        assert!(url.ends_with("MATLAB_Runtime_R2024b_Update_5_win64.zip"));
    }

    #[test]
    fn macos_always_uses_zip() {
        let catalog = Catalog::default();
        for platform in [Platform::Maci64, Platform::Maca64] {
            for (rel, url) in catalog.releases(platform) {
                assert!(url.ends_with(".zip"), "{platform} {rel}");
            }
        }
    }

    #[test]
    fn platform_coverage_matches_published_builds() {
        let catalog = Catalog::default();
        assert_eq!(catalog.releases(Platform::Win32).count(), 8);
        assert_eq!(catalog.releases(Platform::Glnx86).count(), 1);
        assert_eq!(catalog.releases(Platform::Maca64).count(), 3);
        assert_eq!(catalog.releases(Platform::Win64).count(), 14 + 12);
        assert!(catalog.get(Platform::Maca64, &release("R2023a")).is_none());
    }

    #[test]
    fn latest_is_most_recent_known_release() {
        let catalog = Catalog::default();
        assert_eq!(
            catalog.latest(Platform::Glnxa64).map(Release::as_str),
            Some("R2024b")
        );
        assert_eq!(
            catalog.latest(Platform::Win32).map(Release::as_str),
            Some("R2015b")
        );
    }

    #[test]
    fn probe_candidates_count_down_from_ten() {
        let catalog = Catalog::new("http://mirror.local/");
        let candidates = catalog.probe_candidates(Platform::Glnxa64, &release("R2025a"));
        assert_eq!(candidates.len(), 11);
        assert!(candidates[0].starts_with("http://mirror.local/R2025a/Release/10/"));
        assert!(candidates[10].ends_with("MATLAB_Runtime_R2025a_Update_0_glnxa64.zip"));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let catalog = Catalog::new("http://mirror.local/downloads/");
        assert_eq!(catalog.base_url(), "http://mirror.local/downloads");
    }
}
