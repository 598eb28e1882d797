// gpkg-core/src/version.rs
//! Picking a version out of a list of directory or file names.
//!
//! Names may carry a leading alphabetic tag (`GA5.11.2`) and may have fewer
//! than three numeric parts (`5.11`). Anything that still does not parse is
//! ignored. Callers always get back the name they passed in, never the
//! normalised form, since that is what exists on disk.

use gpkg_common::error::{GpkgError, Result};
use gpkg_common::options::LATEST;
use lazy_static::lazy_static;
use regex::Regex;
use semver::{BuildMetadata, Prerelease, Version};

lazy_static! {
    static ref VERSION_RE: Regex = Regex::new(r"^(\d+(\.\d+){0,2})$").unwrap();
}

/// True for a plain dotted version with one to three numeric parts.
pub fn is_plain_version(v: &str) -> bool {
    VERSION_RE.is_match(v)
}

/// Parses a candidate name as a version, ignoring any leading letters.
pub fn parse_version(name: &str) -> Option<Version> {
    let trimmed = name.trim_start_matches(|c: char| c.is_alphabetic());
    let (core, suffix) = match trimmed.find(['-', '+']) {
        Some(idx) => trimmed.split_at(idx),
        None => (trimmed, ""),
    };

    let parts = core
        .split('.')
        .map(|p| p.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    let mut version = Version::new(
        parts[0],
        parts.get(1).copied().unwrap_or(0),
        parts.get(2).copied().unwrap_or(0),
    );

    let (pre, build) = match suffix.split_once('+') {
        Some((pre, build)) => (pre, Some(build)),
        None => (suffix, None),
    };
    if let Some(pre) = pre.strip_prefix('-') {
        version.pre = Prerelease::new(pre).ok()?;
    }
    if let Some(build) = build {
        version.build = BuildMetadata::new(build).ok()?;
    }
    Some(version)
}

fn is_latest(requested: &str) -> bool {
    requested.is_empty() || requested == LATEST
}

/// Picks the item whose version (as given by `version_of`) is the latest, or
/// the one matching an explicit request. Items without a parseable version
/// are skipped. Equal versions are settled by the name that sorts last.
pub fn resolve_by<'a, T>(
    items: &'a [T],
    version_of: impl Fn(&T) -> &str,
    requested: &str,
) -> Option<&'a T> {
    let parsed = items
        .iter()
        .filter_map(|item| parse_version(version_of(item)).map(|v| (v, item)));

    if is_latest(requested) {
        return parsed
            .max_by(|(va, a), (vb, b)| {
                va.cmp(vb)
                    .then_with(|| version_of(a).cmp(version_of(b)))
            })
            .map(|(_, item)| item);
    }

    let wanted = parse_version(requested)?;
    parsed
        .filter(|(v, _)| *v == wanted)
        .max_by(|(_, a), (_, b)| version_of(a).cmp(version_of(b)))
        .map(|(_, item)| item)
}

/// Resolves `requested` (a version or `latest`) against candidate names,
/// returning the original name.
pub fn resolve<S: AsRef<str>>(candidates: &[S], requested: &str) -> Result<String> {
    resolve_by(candidates, |c| c.as_ref(), requested)
        .map(|c| c.as_ref().to_string())
        .ok_or_else(|| GpkgError::NotExist(format!("version {requested:?}")))
}
