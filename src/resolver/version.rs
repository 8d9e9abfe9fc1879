//! Version parsing and range conversion.
//!
//! Every ecosystem's versions are mapped onto `semver::Version` so that
//! constraints become `pubgrub::Range<Version>` and intersect exactly.

use pubgrub::Range;
use semver::{BuildMetadata, Comparator, Op, Prerelease, Version, VersionReq};

use crate::core::Ecosystem;

/// How an ecosystem spells and orders its versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionScheme {
    /// Semantic versioning with a lenient fallback (npm, swift)
    Semver,
    /// PEP 440 mapped onto semver (pip)
    Pep440,
}

impl VersionScheme {
    pub fn for_ecosystem(ecosystem: Ecosystem) -> Self {
        match ecosystem {
            Ecosystem::Pip => VersionScheme::Pep440,
            Ecosystem::Npm | Ecosystem::Swift => VersionScheme::Semver,
        }
    }

    /// Parse a version string. Returns `None` for unparseable versions.
    pub fn parse(&self, raw: &str) -> Option<Version> {
        match self {
            VersionScheme::Semver => parse_version_lenient(raw),
            VersionScheme::Pep440 => parse_pep440(raw).map(|p| p.version),
        }
    }
}

/// Convert a semver VersionReq to a PubGrub Range.
pub fn version_req_to_range(req: &VersionReq) -> Range<Version> {
    if req.comparators.is_empty() {
        return Range::full();
    }

    let mut range = Range::full();

    for comp in &req.comparators {
        let comp_range = comparator_to_range(comp);
        range = range.intersection(&comp_range);
    }

    range
}

/// Convert a single semver Comparator to a PubGrub Range.
fn comparator_to_range(comp: &Comparator) -> Range<Version> {
    let major = comp.major;
    let minor = comp.minor.unwrap_or(0);
    let patch = comp.patch.unwrap_or(0);

    let mut version = Version::new(major, minor, patch);
    version.pre = comp.pre.clone();

    // Next version at the least significant level that was spelled out
    let partial_upper = || upper_bound(major, comp.minor, comp.patch);

    match comp.op {
        Op::Exact if comp.patch.is_some() => Range::singleton(version),

        // =1.2 means >=1.2.0 <1.3.0
        Op::Exact => Range::between(version, partial_upper()),

        Op::Greater if comp.patch.is_some() => Range::strictly_higher_than(version),

        // >1.2 means >=1.3.0
        Op::Greater => Range::higher_than(partial_upper()),

        Op::GreaterEq => Range::higher_than(version),

        Op::Less => Range::strictly_lower_than(version),

        Op::LessEq if comp.patch.is_some() => Range::lower_than(version),

        // <=1.2 means <1.3.0
        Op::LessEq => Range::strictly_lower_than(partial_upper()),

        Op::Tilde => {
            // ~x.y.z allows patch-level changes
            // ~1.2.3 means >=1.2.3 <1.3.0
            let upper = if comp.minor.is_some() {
                Version::new(major, minor + 1, 0)
            } else {
                Version::new(major + 1, 0, 0)
            };

            Range::between(version, upper)
        }

        Op::Caret => {
            // ^x.y.z allows changes that don't modify the left-most non-zero digit
            // ^1.2.3 means >=1.2.3 <2.0.0
            // ^0.2.3 means >=0.2.3 <0.3.0
            // ^0.0.3 means >=0.0.3 <0.0.4
            // ^0.0 means >=0.0.0 <0.1.0
            let upper = if major > 0 || comp.minor.is_none() {
                Version::new(major + 1, 0, 0)
            } else if minor > 0 || comp.patch.is_none() {
                Version::new(0, minor + 1, 0)
            } else {
                Version::new(0, 0, patch + 1)
            };

            Range::between(version, upper)
        }

        Op::Wildcard => {
            // x.y.* means >=x.y.0 <x.(y+1).0
            if comp.minor.is_some() {
                let upper = Version::new(major, minor + 1, 0);
                Range::between(version, upper)
            } else {
                let upper = Version::new(major + 1, 0, 0);
                Range::between(version, upper)
            }
        }

        _ => Range::full(),
    }
}

/// The first version past a partially specified one.
fn upper_bound(major: u64, minor: Option<u64>, patch: Option<u64>) -> Version {
    match (minor, patch) {
        (None, _) => Version::new(major + 1, 0, 0),
        (Some(minor), None) => Version::new(major, minor + 1, 0),
        (Some(minor), Some(patch)) => Version::new(major, minor, patch + 1),
    }
}

/// Parse a version string, allowing for incomplete versions.
pub fn parse_version_lenient(s: &str) -> Option<Version> {
    let s = s.trim();
    let s = s
        .strip_prefix('v')
        .or_else(|| s.strip_prefix('V'))
        .unwrap_or(s);

    // Try exact parse first
    if let Ok(v) = s.parse() {
        return Some(v);
    }

    // Try adding missing components
    let (core, pre) = match s.split_once('-') {
        Some((core, pre)) => (core, Prerelease::new(pre).ok()?),
        None => (s, Prerelease::EMPTY),
    };

    let parts: Vec<&str> = core.split('.').collect();
    let mut version = match parts.len() {
        1 => {
            let major: u64 = parts[0].parse().ok()?;
            Version::new(major, 0, 0)
        }
        2 => {
            let major: u64 = parts[0].parse().ok()?;
            let minor: u64 = parts[1].parse().ok()?;
            Version::new(major, minor, 0)
        }
        _ => return None,
    };
    version.pre = pre;
    Some(version)
}

/// A PEP 440 version mapped onto semver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Pep440 {
    pub version: Version,
    /// Number of release segments as written (`1.26` has two)
    pub segments: usize,
}

/// Parse a PEP 440 version.
///
/// `1.26` becomes `1.26.0`; a fourth release segment becomes build metadata;
/// `.post` becomes build metadata (`post.N.1`, or `post.N.0.M` for a dev
/// release of it). Epochs and local versions are dropped.
///
/// Pre-release phases are numeric so semver orders them the way pip does:
/// `dev` is 0, `a` is 1, `b` is 2 and `rc` is 3. `2.0.dev1` becomes
/// `2.0.0-0.1` and `2.0b1` becomes `2.0.0-2.1.1`; the trailing `1` leaves
/// room for `2.0b1.dev2` (`2.0.0-2.1.0.2`) to sort below `2.0b1`.
pub(crate) fn parse_pep440(raw: &str) -> Option<Pep440> {
    let s = raw.trim().to_ascii_lowercase();
    let s = s.strip_prefix('v').unwrap_or(&s);
    let s = match s.split_once('!') {
        Some((_, rest)) => rest,
        None => s,
    };
    let s = match s.split_once('+') {
        Some((public, _)) => public,
        None => s,
    };

    // Release segments
    let release_end = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let release_str = s[..release_end].trim_end_matches('.');
    if release_str.is_empty() {
        return None;
    }
    let release: Vec<u64> = release_str
        .split('.')
        .map(|p| p.parse().ok())
        .collect::<Option<_>>()?;

    let mut phase: Option<(u64, u64)> = None;
    let mut dev: Option<u64> = None;
    let mut post: Option<u64> = None;
    let mut post_dev: Option<u64> = None;
    let mut build: Vec<String> = release.iter().skip(3).map(|n| n.to_string()).collect();

    let mut rest = &s[release_end..];
    while !rest.is_empty() {
        rest = rest.trim_start_matches(['.', '-', '_']);
        if rest.is_empty() {
            break;
        }
        let label_end = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        let label = &rest[..label_end];
        rest = rest[label_end..].trim_start_matches(['.', '-', '_']);
        let num_end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let number: u64 = if num_end == 0 {
            0
        } else {
            rest[..num_end].parse().ok()?
        };
        rest = &rest[num_end..];

        match label {
            "a" | "alpha" if phase.is_none() && dev.is_none() => phase = Some((1, number)),
            "b" | "beta" if phase.is_none() && dev.is_none() => phase = Some((2, number)),
            "rc" | "c" | "pre" | "preview" if phase.is_none() && dev.is_none() => {
                phase = Some((3, number))
            }
            "dev" if post.is_some() && post_dev.is_none() => post_dev = Some(number),
            "dev" if dev.is_none() => dev = Some(number),
            "post" | "rev" | "r" if post.is_none() => post = Some(number),
            // 1.0-1 is an implicit post release
            "" if num_end > 0 && post.is_none() => post = Some(number),
            _ => return None,
        }
    }

    let mut version = Version::new(
        release[0],
        release.get(1).copied().unwrap_or(0),
        release.get(2).copied().unwrap_or(0),
    );
    let pre = match (phase, dev) {
        (None, None) => String::new(),
        (None, Some(dev)) => format!("0.{}", dev),
        (Some((phase, n)), None) => format!("{}.{}.1", phase, n),
        (Some((phase, n)), Some(dev)) => format!("{}.{}.0.{}", phase, n, dev),
    };
    if !pre.is_empty() {
        version.pre = Prerelease::new(&pre).ok()?;
    }
    if let Some(post) = post {
        build.extend(["post".to_string(), post.to_string()]);
        match post_dev {
            Some(dev) => build.extend(["0".to_string(), dev.to_string()]),
            None => build.push("1".to_string()),
        }
    }
    if !build.is_empty() {
        version.build = BuildMetadata::new(&build.join(".")).ok()?;
    }

    Some(Pep440 {
        version,
        segments: release.len(),
    })
}
