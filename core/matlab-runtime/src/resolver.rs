//! Release and installer URL resolution.
//!
//! Resolution is a two-tier lookup:
//!
//! 1. the immutable [`Catalog`] built from the static tables;
//! 2. a probe cache owned by the [`InstallerResolver`], filled the first time
//!    a release missing from the catalog is found on the download host.
//!
//! The probe tries update numbers from [`MAX_PROBED_UPDATE`] down to 0 and
//! memoizes the first URL that exists. Later lookups of the same release hit
//! the cache and perform no network request.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::catalog::{Catalog, MAX_PROBED_UPDATE, Release};
use crate::errors::{Error, Result};
use crate::fetch::Fetch;
use crate::paths::InstallPaths;
use crate::platform::Platform;

/// Which release an operation should act on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum VersionRequest {
    /// The newest release available for download.
    #[default]
    Latest,
    /// The newest release installed under the prefix, or [`Self::Latest`]
    /// when nothing is installed.
    LatestInstalled,
    /// Every installed release (uninstall only).
    All,
    /// A release label (`R2022b`) or runtime number (`9.13`, `23.2`).
    Named(String),
}

impl VersionRequest {
    /// Parses user text. Sentinels are matched case-insensitively; anything
    /// else is kept verbatim for later normalization.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if text.eq_ignore_ascii_case("latest") {
            Self::Latest
        } else if text.eq_ignore_ascii_case("latest_installed") {
            Self::LatestInstalled
        } else if text.eq_ignore_ascii_case("all") {
            Self::All
        } else {
            Self::Named(text.to_string())
        }
    }
}

impl FromStr for VersionRequest {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&Release> for VersionRequest {
    fn from(release: &Release) -> Self {
        Self::Named(release.as_str().to_string())
    }
}

impl fmt::Display for VersionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::LatestInstalled => f.write_str("latest_installed"),
            Self::All => f.write_str("all"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// Returns the current calendar year (UTC).
///
/// Falls back to 1970 if the system clock reads before the Unix epoch.
#[must_use]
pub fn current_year() -> u32 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    year_from_timestamp(secs)
}

fn year_from_timestamp(timestamp: u64) -> u32 {
    let mut remaining_days = timestamp / 86400;
    let mut year = 1970;
    loop {
        let days_in_year = if is_leap_year(year) { 366 } else { 365 };
        if remaining_days < days_in_year {
            return year;
        }
        remaining_days -= days_in_year;
        year += 1;
    }
}

fn is_leap_year(year: u32) -> bool {
    (year.is_multiple_of(4) && !year.is_multiple_of(100)) || year.is_multiple_of(400)
}

/// Resolves releases and installer URLs against the catalog and the
/// download host.
#[derive(Debug, Clone)]
pub struct InstallerResolver {
    catalog: Catalog,
    probed: HashMap<(Platform, Release), String>,
    year: u32,
}

impl InstallerResolver {
    /// Wraps a catalog. "Latest" is computed against the current year.
    #[must_use]
    pub fn new(catalog: Catalog) -> Self {
        Self::with_year(catalog, current_year())
    }

    /// Wraps a catalog, computing "latest" as if the current year were
    /// `year`.
    #[must_use]
    pub fn with_year(catalog: Catalog, year: u32) -> Self {
        Self {
            catalog,
            probed: HashMap::new(),
            year,
        }
    }

    /// Returns the static catalog.
    #[must_use = "returns the catalog without side effects"]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Returns the URLs discovered by probing so far.
    pub fn probed(&self, platform: Platform) -> impl Iterator<Item = (&Release, &str)> {
        self.probed
            .iter()
            .filter(move |((p, _), _)| *p == platform)
            .map(|((_, release), url)| (release, url.as_str()))
    }

    /// Resolves a request to a concrete release.
    ///
    /// - `Named` identifiers are normalized; no lookup is made.
    /// - `Latest` tries `R{year}b` then `R{year}a` (probing the host if
    ///   needed) and falls back to the newest release known for the platform.
    /// - `LatestInstalled` scans `paths` and behaves like `Latest` when
    ///   nothing is installed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidVersion`] for unnormalizable names and for
    /// `All`, [`Error::VersionNotFound`] if the platform has no release at
    /// all, and any transport error raised while probing.
    pub async fn resolve_release<F: Fetch>(
        &mut self,
        request: &VersionRequest,
        platform: Platform,
        paths: &InstallPaths,
        fetcher: &F,
    ) -> Result<Release> {
        let release = match request {
            VersionRequest::Named(name) => Release::normalize(name)?,
            VersionRequest::All => return Err(Error::invalid_version("all")),
            VersionRequest::LatestInstalled => match paths.latest_installed()? {
                Some(release) => release,
                None => self.latest(platform, fetcher).await?,
            },
            VersionRequest::Latest => self.latest(platform, fetcher).await?,
        };
        tracing::debug!(%request, %release, %platform, "resolved release");
        Ok(release)
    }

    async fn latest<F: Fetch>(&mut self, platform: Platform, fetcher: &F) -> Result<Release> {
        for letter in ['b', 'a'] {
            let candidate = Release::from_year(self.year, letter);
            match self.installer_url(&candidate, platform, fetcher).await {
                Ok(_) => return Ok(candidate),
                Err(Error::VersionNotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        let known = self.catalog.latest(platform).cloned();
        let probed = self.probed(platform).map(|(r, _)| r).max().cloned();
        known
            .into_iter()
            .chain(probed)
            .max()
            .ok_or_else(|| Error::version_not_found("latest", platform.as_str()))
    }

    /// Returns the installer URL of a release.
    ///
    /// Looks in the catalog, then in the probe cache, then probes the host.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VersionNotFound`] if no candidate URL exists, or
    /// [`Error::Download`] if the host cannot be reached.
    pub async fn installer_url<F: Fetch>(
        &mut self,
        release: &Release,
        platform: Platform,
        fetcher: &F,
    ) -> Result<String> {
        if let Some(url) = self.catalog.get(platform, release) {
            tracing::debug!(%release, %platform, url, "catalog hit");
            return Ok(url.to_string());
        }
        let key = (platform, release.clone());
        if let Some(url) = self.probed.get(&key) {
            tracing::debug!(%release, %platform, %url, "probe cache hit");
            return Ok(url.clone());
        }

        tracing::debug!(
            %release,
            %platform,
            max_update = MAX_PROBED_UPDATE,
            "release not in catalog, probing download host"
        );
        for url in self.catalog.probe_candidates(platform, release) {
            tracing::debug!(%url, "probing");
            if fetcher.exists(&url).await? {
                self.probed.insert(key, url.clone());
                return Ok(url);
            }
        }

        Err(Error::version_not_found(release.as_str(), platform.as_str()))
    }
}
