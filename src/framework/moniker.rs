// src/framework/moniker.rs

//! Target framework monikers
//!
//! Parses the short folder form used inside packages (`netstandard2.0`,
//! `net461`, `net6.0-windows`) and the long form used by dependency groups
//! in upstream metadata (`.NETStandard2.0`, `.NETFramework,Version=v4.6.1`).
//! Anything else parses as [`Framework::Unsupported`], which is only ever
//! compatible with itself.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Framework families that take part in compatibility checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FrameworkFamily {
    NetStandard,
    NetCoreApp,
    NetFramework,
}

/// Dotted framework version (`2.0`, `4.6.1`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FrameworkVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
}

impl FrameworkVersion {
    pub const fn new(major: u32, minor: u32, build: u32) -> Self {
        Self { major, minor, build }
    }

    /// "2.0", "4.6.1" or compact "461", "48"
    fn parse(text: &str) -> Option<Self> {
        if text.is_empty() {
            return None;
        }
        let parts: Vec<u32> = if text.contains('.') {
            text.split('.')
                .map(|p| p.parse::<u32>().ok())
                .collect::<Option<Vec<_>>>()?
        } else {
            text.chars()
                .map(|c| c.to_digit(10))
                .collect::<Option<Vec<_>>>()?
        };
        if parts.is_empty() || parts.len() > 4 {
            return None;
        }
        Some(Self {
            major: parts[0],
            minor: parts.get(1).copied().unwrap_or(0),
            build: parts.get(2).copied().unwrap_or(0),
        })
    }
}

/// A parsed target framework moniker
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Framework {
    /// Universal framework: content usable everywhere
    Any,
    Net {
        family: FrameworkFamily,
        version: FrameworkVersion,
        /// OS-specific flavour of .NET 5+ (`net6.0-windows`)
        platform: Option<String>,
    },
    Unsupported(String),
}

impl Framework {
    pub fn net(family: FrameworkFamily, major: u32, minor: u32) -> Self {
        Self::Net {
            family,
            version: FrameworkVersion::new(major, minor, 0),
            platform: None,
        }
    }

    pub fn net_standard(major: u32, minor: u32) -> Self {
        Self::net(FrameworkFamily::NetStandard, major, minor)
    }

    /// Parse a moniker in short or long form; never fails
    pub fn parse(text: &str) -> Self {
        Self::try_parse(text).unwrap_or_else(|| Self::Unsupported(text.trim().to_string()))
    }

    fn try_parse(text: &str) -> Option<Self> {
        let lower = text.trim().to_ascii_lowercase();
        if matches!(lower.as_str(), "" | "any" | "agnostic") {
            return Some(Self::Any);
        }

        // ".NETStandard,Version=v2.0" → "netstandard" + "2.0"
        let compact = lower.trim_start_matches('.').replace(",version=v", "");

        let (family, rest) = if let Some(rest) = compact.strip_prefix("netstandard") {
            (Some(FrameworkFamily::NetStandard), rest)
        } else if let Some(rest) = compact.strip_prefix("netcoreapp") {
            (Some(FrameworkFamily::NetCoreApp), rest)
        } else if let Some(rest) = compact.strip_prefix("netframework") {
            (Some(FrameworkFamily::NetFramework), rest)
        } else if let Some(rest) = compact.strip_prefix("net") {
            (None, rest)
        } else {
            return None;
        };

        let (version_text, platform) = match rest.split_once('-') {
            Some((v, p)) => {
                let name: String = p.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
                (v, (!name.is_empty()).then_some(name))
            }
            None => (rest, None),
        };
        let version = FrameworkVersion::parse(version_text)?;

        // Bare "net": dotted 5.0+ is .NET (Core); everything else is .NET Framework
        let family = family.unwrap_or(if version_text.contains('.') && version.major >= 5 {
            FrameworkFamily::NetCoreApp
        } else {
            FrameworkFamily::NetFramework
        });

        if platform.is_some() && !(family == FrameworkFamily::NetCoreApp && version.major >= 5) {
            return None;
        }

        Some(Self::Net {
            family,
            version,
            platform,
        })
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }

    /// Can a project targeting `self` consume content built for `candidate`?
    pub fn is_compatible_with(&self, candidate: &Framework) -> bool {
        match (self, candidate) {
            (_, Self::Any) => true,
            (Self::Unsupported(a), Self::Unsupported(b)) => a.eq_ignore_ascii_case(b),
            (Self::Unsupported(_), _) | (_, Self::Unsupported(_)) | (Self::Any, _) => false,
            (
                Self::Net {
                    family: target_family,
                    version: target_version,
                    platform: target_platform,
                },
                Self::Net {
                    family,
                    version,
                    platform,
                },
            ) => {
                if platform.is_some() && platform != target_platform {
                    return false;
                }
                if family == target_family {
                    return version <= target_version;
                }
                *family == FrameworkFamily::NetStandard
                    && max_net_standard(*target_family, *target_version)
                        .is_some_and(|max| *version <= max)
            }
        }
    }

    /// Nearness of `candidate` to `self`, higher is nearer
    ///
    /// Only meaningful for compatible pairs. Same family beats netstandard,
    /// netstandard beats the universal framework, and within a rank the
    /// higher version wins.
    fn nearness(&self, candidate: &Framework) -> (u8, FrameworkVersion, bool) {
        match (self, candidate) {
            (_, Self::Any) => (0, FrameworkVersion::default(), false),
            (Self::Net { family: tf, .. }, Self::Net { family, version, platform }) => {
                let rank = if family == tf { 3 } else { 2 };
                (rank, *version, platform.is_some())
            }
            _ => (3, FrameworkVersion::default(), false),
        }
    }

    /// Folder-style short name
    pub fn short_name(&self) -> String {
        match self {
            Self::Any => "any".to_string(),
            Self::Unsupported(raw) => raw.clone(),
            Self::Net {
                family,
                version,
                platform,
            } => {
                let dotted = if version.build > 0 {
                    format!("{}.{}.{}", version.major, version.minor, version.build)
                } else {
                    format!("{}.{}", version.major, version.minor)
                };
                let mut name = match family {
                    FrameworkFamily::NetStandard => format!("netstandard{}", dotted),
                    FrameworkFamily::NetCoreApp if version.major >= 5 => format!("net{}", dotted),
                    FrameworkFamily::NetCoreApp => format!("netcoreapp{}", dotted),
                    FrameworkFamily::NetFramework => {
                        let mut compact = format!("net{}{}", version.major, version.minor);
                        if version.build > 0 {
                            compact.push_str(&version.build.to_string());
                        }
                        compact
                    }
                };
                if let Some(platform) = platform {
                    name.push('-');
                    name.push_str(platform);
                }
                name
            }
        }
    }
}

/// Highest netstandard version a framework implements
fn max_net_standard(family: FrameworkFamily, version: FrameworkVersion) -> Option<FrameworkVersion> {
    let v = |major, minor| Some(FrameworkVersion::new(major, minor, 0));
    match family {
        FrameworkFamily::NetStandard => Some(version),
        FrameworkFamily::NetCoreApp => match version.major {
            0 => None,
            1 => v(1, 6),
            2 => v(2, 0),
            _ => v(2, 1),
        },
        FrameworkFamily::NetFramework => {
            let table = [
                (FrameworkVersion::new(4, 6, 1), FrameworkVersion::new(2, 0, 0)),
                (FrameworkVersion::new(4, 6, 0), FrameworkVersion::new(1, 3, 0)),
                (FrameworkVersion::new(4, 5, 1), FrameworkVersion::new(1, 2, 0)),
                (FrameworkVersion::new(4, 5, 0), FrameworkVersion::new(1, 1, 0)),
            ];
            table
                .iter()
                .find(|(net, _)| version >= *net)
                .map(|(_, standard)| *standard)
        }
    }
}

/// Pick the item whose framework is nearest to `target`
///
/// Incompatible items are ignored; ties keep the earliest item.
pub fn get_nearest<'a, T>(
    items: &'a [T],
    target: &Framework,
    framework_of: impl Fn(&T) -> &Framework,
) -> Option<&'a T> {
    let mut best: Option<(&'a T, (u8, FrameworkVersion, bool))> = None;
    for item in items {
        let candidate = framework_of(item);
        if !target.is_compatible_with(candidate) {
            continue;
        }
        let score = target.nearness(candidate);
        let better = match &best {
            Some((_, best_score)) => score.cmp(best_score) == Ordering::Greater,
            None => true,
        };
        if better {
            best = Some((item, score));
        }
    }
    best.map(|(item, _)| item)
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_name())
    }
}

impl From<String> for Framework {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<Framework> for String {
    fn from(f: Framework) -> Self {
        f.short_name()
    }
}
