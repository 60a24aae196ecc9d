//! Host build versions and the ranges plugins declare against them
//!
//! Host builds do not always print strict semver: "v1.4", "1.4.2 " and
//! "2.0.0-canary.7" all show up. [`HostVersion`] normalises these before a
//! plugin's `host_version_range` is checked.
//!
//! A pre-release host build satisfies a range when either the build itself
//! or its release version does, so a canary of 2.0.0 counts as 2.0.0.

use semver::{Version, VersionReq};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("invalid host version '{value}': {reason}")]
    InvalidHostVersion { value: String, reason: String },

    #[error("invalid host version range '{value}': {reason}")]
    InvalidRange { value: String, reason: String },
}

/// A running host build, as reported by the host or on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostVersion {
    raw: String,
    version: Version,
}

impl HostVersion {
    /// Version with any pre-release and build metadata dropped.
    pub fn release(&self) -> Version {
        Version::new(self.version.major, self.version.minor, self.version.patch)
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn is_prerelease(&self) -> bool {
        !self.version.pre.is_empty()
    }

    /// Whether this build satisfies `range`. A blank range admits every build.
    pub fn satisfies(&self, range: &str) -> Result<bool, VersionError> {
        let Some(req) = parse_range(range)? else {
            return Ok(true);
        };
        Ok(req.matches(&self.version) || (self.is_prerelease() && req.matches(&self.release())))
    }
}

impl FromStr for HostVersion {
    type Err = VersionError;

    /// Accepts an optional `v` prefix and one to three numeric components;
    /// missing minor and patch components are zero.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| VersionError::InvalidHostVersion {
            value: s.to_string(),
            reason,
        };

        let trimmed = s.trim();
        let trimmed = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);
        let split = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
        let (core, suffix) = trimmed.split_at(split);

        let parts: Vec<&str> = core.split('.').collect();
        if parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(invalid("expected MAJOR[.MINOR[.PATCH]]".to_string()));
        }
        let mut padded = parts.join(".");
        for _ in parts.len()..3 {
            padded.push_str(".0");
        }
        padded.push_str(suffix);

        let version = Version::parse(&padded).map_err(|e| invalid(e.to_string()))?;
        Ok(Self {
            raw: s.trim().to_string(),
            version,
        })
    }
}

impl fmt::Display for HostVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Parse a plugin's declared range. `None` for a blank range.
pub fn parse_range(range: &str) -> Result<Option<VersionReq>, VersionError> {
    let range = range.trim();
    if range.is_empty() {
        return Ok(None);
    }
    VersionReq::parse(range)
        .map(Some)
        .map_err(|e| VersionError::InvalidRange {
            value: range.to_string(),
            reason: e.to_string(),
        })
}

/// Check a host build string against an optional plugin range.
///
/// # Examples
///
/// ```
/// use hostpatch::config::version::host_in_range;
///
/// assert!(host_in_range("1.4", Some(">=1.4.0, <2.0.0")).unwrap());
/// assert!(host_in_range("v2.0.0-canary.3", Some("^2.0")).unwrap());
/// assert!(!host_in_range("1.3.9", Some(">=1.4.0")).unwrap());
///
/// // No declared range means every host build
/// assert!(host_in_range("0.1.0", None).unwrap());
/// ```
pub fn host_in_range(host: &str, range: Option<&str>) -> Result<bool, VersionError> {
    match range {
        None => Ok(true),
        Some(range) => host.parse::<HostVersion>()?.satisfies(range),
    }
}
