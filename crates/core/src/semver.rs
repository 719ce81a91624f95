//! Semantic version parsing, formatting, and ordering (C2).
//!
//! Parses `MAJOR.MINOR.PATCH[-pre.release.ids][+build.meta]` per the rules
//! in spec §3/§4.2. Build metadata participates in round-trip formatting but
//! never in comparison or equality.

use std::cmp::Ordering;
use std::fmt;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum PreReleaseIdent {
    Numeric(u64),
    AlphaNumeric(String),
}

#[derive(Debug, Clone, Eq)]
pub struct Semver {
    major: u64,
    minor: u64,
    patch: u64,
    pre_release: Vec<(String, PreReleaseIdent)>,
    build: Vec<String>,
}

impl Semver {
    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> u64 {
        self.minor
    }

    pub fn patch(&self) -> u64 {
        self.patch
    }

    pub fn has_pre_release(&self) -> bool {
        !self.pre_release.is_empty()
    }

    /// Builds a version from already-validated components, re-validating
    /// the derived string form through [`parse`].
    pub fn from_components(
        major: u64,
        minor: u64,
        patch: u64,
        pre_release: &[&str],
        build: &[&str],
    ) -> Result<Self> {
        let mut version = format!("{major}.{minor}.{patch}");
        if !pre_release.is_empty() {
            version.push('-');
            version.push_str(&pre_release.join("."));
        }
        if !build.is_empty() {
            version.push('+');
            version.push_str(&build.join("."));
        }
        parse(&version)
    }
}

impl fmt::Display for Semver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.pre_release.is_empty() {
            write!(f, "-")?;
            let rendered: Vec<&str> = self.pre_release.iter().map(|(raw, _)| raw.as_str()).collect();
            write!(f, "{}", rendered.join("."))?;
        }
        if !self.build.is_empty() {
            write!(f, "+{}", self.build.join("."))?;
        }
        Ok(())
    }
}

impl PartialEq for Semver {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd for Semver {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Semver {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| compare_pre_release(&self.pre_release, &other.pre_release))
    }
}

fn compare_pre_release(
    left: &[(String, PreReleaseIdent)],
    right: &[(String, PreReleaseIdent)],
) -> Ordering {
    // A version with a pre-release is strictly less than the same version
    // without one.
    match (left.is_empty(), right.is_empty()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => {}
    }

    for (l, r) in left.iter().zip(right.iter()) {
        let ordering = compare_pre_release_ident(&l.1, &r.1);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    left.len().cmp(&right.len())
}

fn compare_pre_release_ident(left: &PreReleaseIdent, right: &PreReleaseIdent) -> Ordering {
    match (left, right) {
        (PreReleaseIdent::Numeric(a), PreReleaseIdent::Numeric(b)) => a.cmp(b),
        (PreReleaseIdent::AlphaNumeric(a), PreReleaseIdent::AlphaNumeric(b)) => a.cmp(b),
        (PreReleaseIdent::Numeric(_), PreReleaseIdent::AlphaNumeric(_)) => Ordering::Less,
        (PreReleaseIdent::AlphaNumeric(_), PreReleaseIdent::Numeric(_)) => Ordering::Greater,
    }
}

/// Parses a semantic version string, rejecting every malformed shape listed
/// in spec §4.2.
pub fn parse(input: &str) -> Result<Semver> {
    if input.is_empty() {
        return Err(invalid(input, "version string must not be empty"));
    }

    let (core_and_pre, build_raw) = match input.split_once('+') {
        Some((rest, build)) => (rest, Some(build)),
        None => (input, None),
    };
    let (core, pre_raw) = match core_and_pre.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (core_and_pre, None),
    };

    let mut parts = core.split('.');
    let major_str = parts
        .next()
        .ok_or_else(|| invalid(input, "missing major version component"))?;
    let minor_str = parts
        .next()
        .ok_or_else(|| invalid(input, "missing minor version component"))?;
    let patch_str = parts
        .next()
        .ok_or_else(|| invalid(input, "missing patch version component"))?;
    if parts.next().is_some() {
        return Err(invalid(input, "version core has more than three components"));
    }

    let major = parse_numeric_component(input, major_str)?;
    let minor = parse_numeric_component(input, minor_str)?;
    let patch = parse_numeric_component(input, patch_str)?;

    let pre_release = match pre_raw {
        Some(raw) => parse_pre_release(input, raw)?,
        None => Vec::new(),
    };
    let build = match build_raw {
        Some(raw) => parse_build(input, raw)?,
        None => Vec::new(),
    };

    Ok(Semver {
        major,
        minor,
        patch,
        pre_release,
        build,
    })
}

fn parse_numeric_component(input: &str, raw: &str) -> Result<u64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(
            input,
            format!("version component `{raw}` must be all digits"),
        ));
    }
    if raw.len() > 1 && raw.starts_with('0') {
        return Err(invalid(
            input,
            format!("version component `{raw}` has a leading zero"),
        ));
    }
    raw.parse::<u64>()
        .map_err(|_| invalid(input, format!("version component `{raw}` overflows u64")))
}

fn validate_identifier_charset(input: &str, raw: &str) -> Result<()> {
    if raw.is_empty() {
        return Err(invalid(input, "identifier segment must not be empty"));
    }
    if !raw
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-')
    {
        return Err(invalid(
            input,
            format!("identifier `{raw}` contains characters outside [0-9A-Za-z-]"),
        ));
    }
    Ok(())
}

fn parse_pre_release(input: &str, raw: &str) -> Result<Vec<(String, PreReleaseIdent)>> {
    if raw.is_empty() {
        return Err(invalid(input, "pre-release metadata must not be empty"));
    }
    raw.split('.')
        .map(|segment| {
            validate_identifier_charset(input, segment)?;
            let is_numeric = segment.bytes().all(|b| b.is_ascii_digit());
            if is_numeric {
                if segment.len() > 1 && segment.starts_with('0') {
                    return Err(invalid(
                        input,
                        format!("numeric pre-release identifier `{segment}` has a leading zero"),
                    ));
                }
                let value = segment
                    .parse::<u64>()
                    .map_err(|_| invalid(input, format!("pre-release `{segment}` overflows u64")))?;
                Ok((segment.to_string(), PreReleaseIdent::Numeric(value)))
            } else {
                Ok((
                    segment.to_string(),
                    PreReleaseIdent::AlphaNumeric(segment.to_string()),
                ))
            }
        })
        .collect()
}

fn parse_build(input: &str, raw: &str) -> Result<Vec<String>> {
    if raw.is_empty() {
        return Err(invalid(input, "build metadata must not be empty"));
    }
    raw.split('.')
        .map(|segment| {
            validate_identifier_charset(input, segment)?;
            Ok(segment.to_string())
        })
        .collect()
}

fn invalid(input: &str, reason: impl Into<String>) -> CoreError {
    CoreError::InvalidSemver {
        value: input.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plain_versions() {
        for v in ["1.0.0", "0.0.1", "10.20.30"] {
            assert_eq!(parse(v).unwrap().to_string(), v);
        }
    }

    #[test]
    fn round_trips_pre_release_and_build() {
        for v in [
            "1.0.0-alpha",
            "1.0.0-alpha.1",
            "1.0.0-0.3.7",
            "1.0.0-x.7.z.92",
            "1.0.0+20130313144700",
            "1.0.0-beta+exp.sha.5114f85",
        ] {
            assert_eq!(parse(v).unwrap().to_string(), v);
        }
    }

    #[test]
    fn rejects_empty_input() {
        assert!(parse("").is_err());
    }

    #[test]
    fn rejects_missing_components() {
        assert!(parse("1.0").is_err());
        assert!(parse("1").is_err());
    }

    #[test]
    fn rejects_non_digit_numeric_fields() {
        assert!(parse("1.a.0").is_err());
    }

    #[test]
    fn rejects_leading_zeros() {
        assert!(parse("01.0.0").is_err());
        assert!(parse("1.0.0-01").is_err());
    }

    #[test]
    fn accepts_zero_itself() {
        assert!(parse("0.0.0").is_ok());
        assert!(parse("1.0.0-0").is_ok());
    }

    #[test]
    fn rejects_empty_pre_release_or_build_segments() {
        assert!(parse("1.0.0-").is_err());
        assert!(parse("1.0.0+").is_err());
        assert!(parse("1.0.0-alpha..1").is_err());
    }

    #[test]
    fn rejects_invalid_characters() {
        assert!(parse("1.0.0-alp_ha").is_err());
    }

    #[test]
    fn build_metadata_is_ignored_for_equality_and_order() {
        let a = parse("1.0.0+build1").unwrap();
        let b = parse("1.0.0+build2").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.cmp(&b), Ordering::Equal);
    }

    #[test]
    fn matches_semver_org_reference_precedence_example() {
        let versions = [
            "1.0.0-alpha",
            "1.0.0-alpha.1",
            "1.0.0-alpha.beta",
            "1.0.0-beta",
            "1.0.0-beta.2",
            "1.0.0-beta.11",
            "1.0.0-rc.1",
            "1.0.0",
        ];
        let parsed: Vec<Semver> = versions.iter().map(|v| parse(v).unwrap()).collect();
        for window in parsed.windows(2) {
            assert!(
                window[0] < window[1],
                "{} should be < {}",
                window[0],
                window[1]
            );
        }
    }

    #[test]
    fn from_components_builds_matching_string() {
        let version = Semver::from_components(1, 2, 3, &["rc", "1"], &[]).unwrap();
        assert_eq!(version.to_string(), "1.2.3-rc.1");
    }
}
