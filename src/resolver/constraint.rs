//! Per-ecosystem constraint languages.

use std::fmt;

use pubgrub::Range;
use semver::{Prerelease, Version, VersionReq};

use crate::core::Ecosystem;
use crate::resolver::version::{parse_pep440, version_req_to_range};

/// A parsed version constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// Any version inside the range
    Versions(Range<Version>),
    /// Exactly this source revision
    Revision(String),
}

impl Constraint {
    /// The constraint that accepts every version.
    pub fn any() -> Self {
        Constraint::Versions(Range::full())
    }

    /// Parse constraint text in the ecosystem's own language.
    pub fn parse(ecosystem: Ecosystem, text: &str) -> Result<Self, String> {
        let text = text.trim();
        match ecosystem {
            Ecosystem::Pip => parse_pep440_specifier(text).map(Constraint::Versions),
            Ecosystem::Npm | Ecosystem::Swift => {
                if let Some(rev) = text.strip_prefix("revision:") {
                    let rev = rev.trim();
                    if rev.is_empty() {
                        return Err("empty revision".into());
                    }
                    return Ok(Constraint::Revision(rev.to_string()));
                }
                parse_npm_range(text).map(Constraint::Versions)
            }
        }
    }

    /// Combine two constraints so that both hold.
    pub fn intersect(&self, other: &Constraint) -> Constraint {
        match (self, other) {
            (Constraint::Versions(a), Constraint::Versions(b)) => {
                Constraint::Versions(a.intersection(b))
            }
            (Constraint::Revision(a), Constraint::Revision(b)) if a == b => self.clone(),
            // A pinned revision wins over a range it cannot be compared with
            (Constraint::Revision(_), Constraint::Versions(r))
            | (Constraint::Versions(r), Constraint::Revision(_))
                if *r == Range::full() =>
            {
                match self {
                    Constraint::Revision(_) => self.clone(),
                    Constraint::Versions(_) => other.clone(),
                }
            }
            _ => Constraint::Versions(Range::empty()),
        }
    }

    pub fn matches(&self, version: &Version) -> bool {
        match self {
            Constraint::Versions(range) => range.contains(version),
            Constraint::Revision(_) => false,
        }
    }

    /// Whether no version can satisfy the constraint.
    pub fn is_empty(&self) -> bool {
        matches!(self, Constraint::Versions(r) if *r == Range::empty())
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Versions(range) => write!(f, "{}", range),
            Constraint::Revision(rev) => write!(f, "revision {}", rev),
        }
    }
}

/// Parse a PEP 440 specifier set such as `>=2.0,<3.0` or `~=1.4.5`.
fn parse_pep440_specifier(text: &str) -> Result<Range<Version>, String> {
    let mut range = Range::full();

    for clause in text.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        let (op, rest) = split_operator(clause, &["===", "~=", "==", "!=", ">=", "<=", ">", "<"]);
        let op = if op.is_empty() { "==" } else { op };
        let rest = rest.trim();

        let clause_range = if let Some(prefix) = rest.strip_suffix(".*") {
            let p = parse_pep440(prefix)
                .ok_or_else(|| format!("invalid version `{}` in `{}`", prefix, clause))?;
            let wildcard = Range::between(
                below_prereleases(p.version.clone()),
                below_prereleases(bump_segment(&p.version, p.segments)),
            );
            match op {
                "==" => wildcard,
                "!=" => wildcard.complement(),
                _ => return Err(format!("wildcard not allowed with `{}` in `{}`", op, clause)),
            }
        } else {
            let p = parse_pep440(rest)
                .ok_or_else(|| format!("invalid version `{}` in `{}`", rest, clause))?;
            let v = p.version;
            match op {
                "==" | "===" => Range::singleton(v),
                "!=" => Range::singleton(v).complement(),
                ">=" => Range::higher_than(v),
                ">" => Range::strictly_higher_than(v),
                "<=" => Range::lower_than(v),
                "<" => Range::strictly_lower_than(below_prereleases(v)),
                "~=" => {
                    if p.segments < 2 {
                        return Err(format!("`~=` needs at least two segments in `{}`", clause));
                    }
                    let upper = below_prereleases(bump_segment(&v, p.segments - 1));
                    Range::between(v, upper)
                }
                _ => return Err(format!("unknown operator in `{}`", clause)),
            }
        };

        range = range.intersection(&clause_range);
    }

    Ok(range)
}

/// Increment the release segment at `segments` (1-based) and zero the rest.
fn bump_segment(v: &Version, segments: usize) -> Version {
    match segments {
        0 | 1 => Version::new(v.major + 1, 0, 0),
        2 => Version::new(v.major, v.minor + 1, 0),
        _ => Version::new(v.major, v.minor, v.patch + 1),
    }
}

/// The lowest pre-release of a final release, so an exclusive bound at `v`
/// also shuts out `v`'s dev, alpha, beta and rc releases. Pre-releases and
/// post releases are returned unchanged.
fn below_prereleases(mut v: Version) -> Version {
    if v.pre.is_empty() && v.build.is_empty() {
        if let Ok(lowest) = Prerelease::new("0") {
            v.pre = lowest;
        }
    }
    v
}

fn split_operator<'a>(clause: &'a str, ops: &[&'static str]) -> (&'static str, &'a str) {
    for op in ops {
        if let Some(rest) = clause.strip_prefix(op) {
            return (*op, rest);
        }
    }
    ("", clause)
}

/// Parse an npm range such as `^1.2.0 || >=2.1 <3` or `1.0 - 2.0`.
///
/// Each comparator set is rewritten into a comma-separated `VersionReq` and
/// converted with the shared range conversion; alternatives are unioned.
fn parse_npm_range(text: &str) -> Result<Range<Version>, String> {
    if text.is_empty() || text == "latest" {
        return Ok(Range::full());
    }

    let mut range = Range::empty();
    for alternative in text.split("||").map(str::trim) {
        range = range.union(&parse_npm_set(alternative)?);
    }
    Ok(range)
}

fn parse_npm_set(set: &str) -> Result<Range<Version>, String> {
    if set.is_empty() {
        return Ok(Range::full());
    }

    let tokens: Vec<&str> = set.split_whitespace().collect();

    // Hyphen range: `a - b`
    if tokens.len() == 3 && tokens[1] == "-" {
        let req = format!(">={}, <={}", strip_v(tokens[0]), strip_v(tokens[2]));
        return parse_req(&req, set);
    }

    let mut comparators = Vec::new();
    let mut pending_op: Option<&str> = None;
    for token in tokens {
        if token.chars().all(|c| matches!(c, '<' | '>' | '=' | '^' | '~')) {
            pending_op = Some(token);
            continue;
        }
        let token = match pending_op.take() {
            Some(op) => format!("{}{}", op, token),
            None => token.to_string(),
        };
        if let Some(comparator) = npm_comparator(&token) {
            comparators.push(comparator);
        }
    }

    if comparators.is_empty() {
        return Ok(Range::full());
    }
    parse_req(&comparators.join(", "), set)
}

/// Rewrite one npm comparator into `VersionReq` syntax. Returns `None` for
/// wildcards that match everything.
fn npm_comparator(token: &str) -> Option<String> {
    let token = token.replace("~>", "~");
    let op_end = token
        .find(|c: char| !matches!(c, '<' | '>' | '=' | '^' | '~'))
        .unwrap_or(token.len());
    let (op, version) = token.split_at(op_end);
    let version = strip_v(version);

    if matches!(version, "" | "*" | "x" | "X") {
        return None;
    }

    let has_wildcard = version
        .split('.')
        .any(|part| matches!(part, "*" | "x" | "X"));
    let version = version
        .split('.')
        .take_while(|part| !matches!(*part, "*" | "x" | "X"))
        .collect::<Vec<_>>()
        .join(".");

    Some(match (op, has_wildcard) {
        ("" | "=", true) => format!("{}.*", version),
        ("" | "=", false) => format!("={}", version),
        (op, _) => format!("{}{}", op, version),
    })
}

fn strip_v(s: &str) -> &str {
    s.strip_prefix('v').unwrap_or(s)
}

fn parse_req(req: &str, original: &str) -> Result<Range<Version>, String> {
    let req: VersionReq = req
        .parse()
        .map_err(|e| format!("invalid range `{}`: {}", original, e))?;
    Ok(version_req_to_range(&req))
}

/// Whether a version is a pre-release under the ecosystem's scheme.
pub(crate) fn is_prerelease(version: &Version) -> bool {
    !version.pre.is_empty()
}
