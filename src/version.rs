//! Semantic version with the compatibility predicate used to gate symbol
//! resolution and the caller/runtime ABI handshake (`spec.md` §3, §4.1).

use core::fmt;
use core::str::FromStr;

/// An immutable semantic version: `{major, minor, patch, pre?, build?}`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Version {
    /// Major version component.
    pub major: u64,
    /// Minor version component.
    pub minor: u64,
    /// Patch version component.
    pub patch: u64,
    /// Pre-release identifier, e.g. `rc.1`.
    pub pre: Option<String>,
    /// Build metadata, e.g. a commit hash. Never affects ordering.
    pub build: Option<String>,
}

/// Failure parsing a version string.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum VersionParseError {
    /// The string did not contain at least `major.minor.patch`.
    #[error("version string `{0}` is missing a required component")]
    MissingComponent(String),
    /// A numeric component did not parse as `u64`.
    #[error("version component `{0}` is not a valid number")]
    InvalidNumber(String),
}

impl Version {
    /// Constructs a version with no pre-release or build metadata.
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: None,
            build: None,
        }
    }

    /// Attaches a pre-release identifier.
    #[must_use]
    pub fn with_pre(mut self, pre: impl Into<String>) -> Self {
        self.pre = Some(pre.into());
        self
    }

    /// Attaches build metadata.
    #[must_use]
    pub fn with_build(mut self, build: impl Into<String>) -> Self {
        self.build = Some(build.into());
        self
    }

    /// Compares `(major, minor, patch, pre)` ignoring build metadata, per
    /// semver ordering (a pre-release is always less than the same
    /// major.minor.patch without one).
    #[must_use]
    pub fn semver_cmp(&self, other: &Self) -> core::cmp::Ordering {
        use core::cmp::Ordering::Equal;
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.pre, &other.pre) {
                (None, None) => Equal,
                (None, Some(_)) => core::cmp::Ordering::Greater,
                (Some(_), None) => core::cmp::Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }

    /// `satisfies(got, required)`: does `self` (the exporter's / runtime's
    /// version) satisfy a caller's `required` expectation?
    ///
    /// `got.major == required.major` AND (if `required.major == 0` then
    /// `got.minor == required.minor`) AND `got >= required` in semver order
    /// (Testable Property #2).
    #[must_use]
    pub fn satisfies(&self, required: &Self) -> bool {
        if self.major != required.major {
            return false;
        }
        if required.major == 0 && self.minor != required.minor {
            return false;
        }
        self.semver_cmp(required) != core::cmp::Ordering::Less
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre {
            write!(f, "-{pre}")?;
        }
        if let Some(build) = &self.build {
            write!(f, "+{build}")?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (core_and_pre, build) = match s.split_once('+') {
            Some((a, b)) => (a, Some(b.to_owned())),
            None => (s, None),
        };
        let (core, pre) = match core_and_pre.split_once('-') {
            Some((a, b)) => (a, Some(b.to_owned())),
            None => (core_and_pre, None),
        };

        let mut parts = core.split('.');
        let mut next = |label: &str| -> Result<u64, VersionParseError> {
            let raw = parts
                .next()
                .ok_or_else(|| VersionParseError::MissingComponent(s.to_owned()))?;
            raw.parse::<u64>()
                .map_err(|_| VersionParseError::InvalidNumber(format!("{label}=`{raw}`")))
        };

        let major = next("major")?;
        let minor = next("minor")?;
        let patch = next("patch")?;
        if parts.next().is_some() {
            return Err(VersionParseError::MissingComponent(s.to_owned()));
        }

        Ok(Self {
            major,
            minor,
            patch,
            pre,
            build,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_triple() {
        let v: Version = "1.2.3".parse().unwrap();
        assert_eq!(v, Version::new(1, 2, 3));
    }

    #[test]
    fn parses_pre_and_build() {
        let v: Version = "1.2.3-rc.1+deadbeef".parse().unwrap();
        assert_eq!(v.pre.as_deref(), Some("rc.1"));
        assert_eq!(v.build.as_deref(), Some("deadbeef"));
    }

    #[test]
    fn round_trips_through_display() {
        let v = Version::new(1, 2, 3).with_pre("rc.1").with_build("abc");
        let formatted = v.to_string();
        let parsed: Version = formatted.parse().unwrap();
        assert_eq!(v, parsed);
    }

    #[test]
    fn rejects_missing_components() {
        assert!("1.2".parse::<Version>().is_err());
        assert!("1.2.3.4".parse::<Version>().is_err());
    }

    #[test]
    fn rejects_non_numeric() {
        assert!("a.b.c".parse::<Version>().is_err());
    }

    #[test]
    fn satisfies_requires_matching_major() {
        let got = Version::new(2, 0, 0);
        let required = Version::new(1, 0, 0);
        assert!(!got.satisfies(&required));
    }

    #[test]
    fn satisfies_requires_matching_minor_on_major_zero() {
        let got = Version::new(0, 2, 0);
        let required = Version::new(0, 1, 0);
        // Same major (0) but different minor: not compatible even though got > required.
        assert!(!got.satisfies(&required));

        let got_same_minor = Version::new(0, 1, 5);
        assert!(got_same_minor.satisfies(&required));
    }

    #[test]
    fn satisfies_requires_got_gte_required_on_stable_major() {
        let required = Version::new(1, 2, 0);
        assert!(Version::new(1, 2, 0).satisfies(&required));
        assert!(Version::new(1, 3, 0).satisfies(&required));
        assert!(Version::new(1, 2, 5).satisfies(&required));
        assert!(!Version::new(1, 1, 9).satisfies(&required));
    }

    #[test]
    fn pre_release_orders_below_release() {
        let pre = Version::new(1, 0, 0).with_pre("rc.1");
        let release = Version::new(1, 0, 0);
        assert_eq!(pre.semver_cmp(&release), core::cmp::Ordering::Less);
    }

    proptest::proptest! {
        #[test]
        fn parse_format_round_trip(major in 0u64..1000, minor in 0u64..1000, patch in 0u64..1000) {
            let v = Version::new(major, minor, patch);
            let formatted = v.to_string();
            let parsed: Version = formatted.parse().unwrap();
            proptest::prop_assert_eq!(v, parsed);
        }

        #[test]
        fn satisfies_implies_major_match_and_gte(
            gmaj in 0u64..5, gmin in 0u64..5, gpat in 0u64..5,
            rmaj in 0u64..5, rmin in 0u64..5, rpat in 0u64..5,
        ) {
            let got = Version::new(gmaj, gmin, gpat);
            let required = Version::new(rmaj, rmin, rpat);
            if got.satisfies(&required) {
                proptest::prop_assert_eq!(got.major, required.major);
                if required.major == 0 {
                    proptest::prop_assert_eq!(got.minor, required.minor);
                }
                proptest::prop_assert_ne!(got.semver_cmp(&required), core::cmp::Ordering::Less);
            }
        }
    }
}
