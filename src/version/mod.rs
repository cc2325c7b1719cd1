// src/version/mod.rs

//! NuGet versions and version ranges
//!
//! Upstream versions have up to four numeric parts plus an optional
//! prerelease label (`1.2.3.4-beta.1+build`). Ranges use NuGet interval
//! notation: `1.0` means "1.0 or later", `[1.0,2.0)` is half-open, `[1.0]`
//! pins a single version.

use crate::error::{Error, Result};
use semver::Prerelease;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A parsed upstream package version
///
/// Ordering compares the numeric parts first, then the prerelease label
/// with semver 2 rules (a stable version sorts after any of its prereleases).
/// Build metadata is dropped on parse; it never affects identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NuGetVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub revision: u64,
    pub pre: Prerelease,
}

impl NuGetVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            revision: 0,
            pre: Prerelease::EMPTY,
        }
    }

    /// Parse a version string
    ///
    /// Examples:
    /// - "1.0" → 1.0.0
    /// - "9.32.0.97167" → four-part version
    /// - "2.0.0-Preview.3+sha.abc" → prerelease "preview.3", metadata dropped
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let without_metadata = s.split_once('+').map_or(s, |(v, _)| v);
        let (numbers, label) = match without_metadata.split_once('-') {
            Some((n, l)) => (n, Some(l)),
            None => (without_metadata, None),
        };

        let parts: Vec<&str> = numbers.split('.').collect();
        if numbers.is_empty() || parts.len() > 4 {
            return Err(Error::ParseError(format!("Invalid version '{}'", s)));
        }

        let mut values = [0u64; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part.parse::<u64>().map_err(|e| {
                Error::ParseError(format!("Invalid version component in '{}': {}", s, e))
            })?;
        }

        // NuGet compares labels case-insensitively
        let pre = match label {
            Some("") => {
                return Err(Error::ParseError(format!("Empty prerelease label in '{}'", s)));
            }
            Some(l) => Prerelease::new(&l.to_ascii_lowercase()).map_err(|e| {
                Error::ParseError(format!("Invalid prerelease label in '{}': {}", s, e))
            })?,
            None => Prerelease::EMPTY,
        };

        Ok(Self {
            major: values[0],
            minor: values[1],
            patch: values[2],
            revision: values[3],
            pre,
        })
    }

    pub fn is_prerelease(&self) -> bool {
        !self.pre.is_empty()
    }

    /// Version string for the target registry (three numeric parts)
    ///
    /// npm versions have no fourth numeric part; a nonzero revision is kept
    /// as build metadata (`9.32.0.97167` becomes `9.32.0+97167`).
    pub fn to_npm(&self) -> String {
        let mut out = format!("{}.{}.{}", self.major, self.minor, self.patch);
        if self.is_prerelease() {
            out.push('-');
            out.push_str(self.pre.as_str());
        }
        if self.revision > 0 {
            out.push('+');
            out.push_str(&self.revision.to_string());
        }
        out
    }
}

impl fmt::Display for NuGetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.revision > 0 {
            write!(f, ".{}", self.revision)?;
        }
        if self.is_prerelease() {
            write!(f, "-{}", self.pre)?;
        }
        Ok(())
    }
}

impl FromStr for NuGetVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for NuGetVersion {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<NuGetVersion> for String {
    fn from(v: NuGetVersion) -> Self {
        v.to_string()
    }
}

/// A NuGet version interval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionRange {
    pub min: Option<NuGetVersion>,
    pub min_inclusive: bool,
    pub max: Option<NuGetVersion>,
    pub max_inclusive: bool,
}

impl VersionRange {
    /// The unbounded range
    pub fn all() -> Self {
        Self {
            min: None,
            min_inclusive: false,
            max: None,
            max_inclusive: false,
        }
    }

    /// `version` or later
    pub fn at_least(version: NuGetVersion) -> Self {
        Self {
            min: Some(version),
            min_inclusive: true,
            max: None,
            max_inclusive: false,
        }
    }

    /// Parse NuGet range notation
    ///
    /// Examples:
    /// - "1.0" → >= 1.0
    /// - "[1.0]" → exactly 1.0
    /// - "[1.0,2.0)" → >= 1.0 and < 2.0
    /// - "(,2.0]" → <= 2.0
    /// - "*" or "" → any version
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s == "*" {
            return Ok(Self::all());
        }

        let opening = s.chars().next();
        if !matches!(opening, Some('[') | Some('(')) {
            return Ok(Self::at_least(NuGetVersion::parse(s)?));
        }

        let closing = s.chars().last();
        if s.len() < 2 || !matches!(closing, Some(']') | Some(')')) {
            return Err(Error::ParseError(format!("Unterminated version range '{}'", s)));
        }
        let min_inclusive = opening == Some('[');
        let max_inclusive = closing == Some(']');
        let inner = &s[1..s.len() - 1];

        let Some((left, right)) = inner.split_once(',') else {
            // "[1.0]" is the only valid single-bound form
            if !(min_inclusive && max_inclusive) {
                return Err(Error::ParseError(format!("Invalid exact range '{}'", s)));
            }
            let version = NuGetVersion::parse(inner)?;
            return Ok(Self {
                min: Some(version.clone()),
                min_inclusive: true,
                max: Some(version),
                max_inclusive: true,
            });
        };

        let parse_bound = |text: &str| -> Result<Option<NuGetVersion>> {
            let text = text.trim();
            if text.is_empty() {
                Ok(None)
            } else {
                NuGetVersion::parse(text).map(Some)
            }
        };
        let min = parse_bound(left)?;
        let max = parse_bound(right)?;

        if min.is_none() && max.is_none() {
            return Err(Error::ParseError(format!("Range '{}' has no bounds", s)));
        }
        if let (Some(lo), Some(hi)) = (&min, &max) {
            let empty = lo > hi || (lo == hi && !(min_inclusive && max_inclusive));
            if empty {
                return Err(Error::ParseError(format!("Range '{}' is empty", s)));
            }
        }

        Ok(Self {
            min_inclusive: min_inclusive && min.is_some(),
            max_inclusive: max_inclusive && max.is_some(),
            min,
            max,
        })
    }

    /// Check if a version lies inside this range
    pub fn satisfies(&self, version: &NuGetVersion) -> bool {
        let above_min = match &self.min {
            Some(min) if self.min_inclusive => version >= min,
            Some(min) => version > min,
            None => true,
        };
        let below_max = match &self.max {
            Some(max) if self.max_inclusive => version <= max,
            Some(max) => version < max,
            None => true,
        };
        above_min && below_max
    }

    /// Lower bound, if any
    pub fn min_version(&self) -> Option<&NuGetVersion> {
        self.min.as_ref()
    }
}

impl Default for VersionRange {
    fn default() -> Self {
        Self::all()
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.min, &self.max) {
            (None, None) => write!(f, "*"),
            (Some(lo), Some(hi)) if lo == hi && self.min_inclusive && self.max_inclusive => {
                write!(f, "[{}]", lo)
            }
            (lo, hi) => {
                write!(f, "{}", if self.min_inclusive { '[' } else { '(' })?;
                if let Some(lo) = lo {
                    write!(f, "{}", lo)?;
                }
                write!(f, ", ")?;
                if let Some(hi) = hi {
                    write!(f, "{}", hi)?;
                }
                write!(f, "{}", if self.max_inclusive { ']' } else { ')' })
            }
        }
    }
}

impl FromStr for VersionRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VersionRange {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<VersionRange> for String {
    fn from(r: VersionRange) -> Self {
        r.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> NuGetVersion {
        NuGetVersion::parse(s).unwrap()
    }

    #[test]
    fn test_version_parse_short_forms() {
        let version = v("1.0");
        assert_eq!((version.major, version.minor, version.patch), (1, 0, 0));
        assert_eq!(version, v("1.0.0.0"));
        assert_eq!(v("7").to_string(), "7.0.0");
    }

    #[test]
    fn test_version_parse_four_parts() {
        let version = v("9.32.0.97167");
        assert_eq!(version.revision, 97167);
        assert_eq!(version.to_string(), "9.32.0.97167");
        assert_eq!(version.to_npm(), "9.32.0+97167");
    }

    #[test]
    fn test_npm_version_keeps_revision() {
        assert_eq!(v("1.2.3.0").to_npm(), "1.2.3");
        assert_eq!(v("9.32.0.1-beta").to_npm(), "9.32.0-beta+1");
        assert_ne!(v("9.32.0.97167").to_npm(), v("9.32.0.97168").to_npm());
        assert_eq!(NuGetVersion::parse(&v("9.32.0.97167").to_npm()).unwrap().major, 9);
    }

    #[test]
    fn test_version_parse_prerelease_and_metadata() {
        let version = v("2.0.0-Preview.3+sha.abc");
        assert!(version.is_prerelease());
        assert_eq!(version.to_string(), "2.0.0-preview.3");
        assert_eq!(version.to_npm(), "2.0.0-preview.3");
        assert_eq!(version, v("2.0.0-preview.3"));
    }

    #[test]
    fn test_version_parse_invalid() {
        assert!(NuGetVersion::parse("").is_err());
        assert!(NuGetVersion::parse("1.2.3.4.5").is_err());
        assert!(NuGetVersion::parse("1.x").is_err());
        assert!(NuGetVersion::parse("1.0-").is_err());
    }

    #[test]
    fn test_version_ordering() {
        assert!(v("1.0.0") < v("1.0.1"));
        assert!(v("1.0.0.1") > v("1.0.0"));
        assert!(v("1.0.0-beta") < v("1.0.0"));
        assert!(v("1.0.0-alpha") < v("1.0.0-beta"));
        assert!(v("1.0.0-beta.2") < v("1.0.0-beta.11"));
        assert!(v("1.1.0-alpha") > v("1.0.0"));
    }

    #[test]
    fn test_range_plain_version_is_minimum() {
        let range = VersionRange::parse("1.2").unwrap();
        assert!(range.satisfies(&v("1.2.0")));
        assert!(range.satisfies(&v("5.0.0")));
        assert!(!range.satisfies(&v("1.1.9")));
        assert_eq!(range.to_string(), "[1.2.0, )");
    }

    #[test]
    fn test_range_half_open() {
        let range = VersionRange::parse("[1.0,2.0)").unwrap();
        assert!(range.satisfies(&v("1.0")));
        assert!(range.satisfies(&v("1.9.9")));
        assert!(!range.satisfies(&v("2.0")));
        assert_eq!(range.min_version(), Some(&v("1.0")));
        assert_eq!(range.to_string(), "[1.0.0, 2.0.0)");
    }

    #[test]
    fn test_range_exact_and_upper_only() {
        let exact = VersionRange::parse("[7.11.0]").unwrap();
        assert!(exact.satisfies(&v("7.11.0")));
        assert!(!exact.satisfies(&v("7.11.1")));
        assert_eq!(exact.to_string(), "[7.11.0]");

        let upper = VersionRange::parse("(,2.0]").unwrap();
        assert!(upper.satisfies(&v("0.1")));
        assert!(upper.satisfies(&v("2.0")));
        assert!(!upper.satisfies(&v("2.0.1")));
        assert!(upper.min_version().is_none());
    }

    #[test]
    fn test_range_any() {
        let range = VersionRange::parse("*").unwrap();
        assert!(range.satisfies(&v("0.0.1-alpha")));
        assert_eq!(range, VersionRange::parse("").unwrap());
    }

    #[test]
    fn test_range_invalid() {
        assert!(VersionRange::parse("[2.0,1.0]").is_err());
        assert!(VersionRange::parse("(1.0)").is_err());
        assert!(VersionRange::parse("[1.0,1.0)").is_err());
        assert!(VersionRange::parse("[1.0").is_err());
        assert!(VersionRange::parse("(,)").is_err());
    }

    #[test]
    fn test_range_serde_as_string() {
        let range: VersionRange = serde_json::from_str("\"[1.0, )\"").unwrap();
        assert_eq!(range, VersionRange::at_least(v("1.0")));
        assert_eq!(serde_json::to_string(&range).unwrap(), "\"[1.0.0, )\"");
    }
}
