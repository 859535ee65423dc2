use std::collections::BTreeMap;

use pep440_rs::{Operator, Version, VersionSpecifier};

/// Records `specifier` under its `version_*` key.
///
/// `~=V` is recorded as `version_gte = V` and `version_lt` set to the first release it excludes.
/// Returns `None` if that release is out of range.
pub(crate) fn insert_specifier(
    specifier: &VersionSpecifier,
    metadata: &mut BTreeMap<String, String>,
) -> Option<()> {
    let version = specifier.version();
    let (key, value) = match specifier.operator() {
        Operator::Equal | Operator::ExactEqual => ("version_eq", version.to_string()),
        Operator::EqualStar => ("version_eq", format!("{version}.*")),
        Operator::NotEqual => ("version_neq", version.to_string()),
        Operator::NotEqualStar => ("version_neq", format!("{version}.*")),
        Operator::LessThan => ("version_lt", version.to_string()),
        Operator::LessThanEqual => ("version_lte", version.to_string()),
        Operator::GreaterThan => ("version_gt", version.to_string()),
        Operator::GreaterThanEqual => ("version_gte", version.to_string()),
        Operator::TildeEqual => {
            let upper = next_incompatible_release(version)?;
            metadata.insert("version_gte".to_string(), version.to_string());
            ("version_lt", upper)
        }
    };
    metadata.insert(key.to_string(), value);
    Some(())
}

/// The first release that `~=version` excludes: `1.4.5` gives `1.5`, `2.2` gives `3`.
///
/// Returns `None` if the version has fewer than two release segments or the bump overflows.
pub(crate) fn next_incompatible_release(version: &Version) -> Option<String> {
    let mut release: Vec<u64> = version.release().iter().copied().collect();
    if release.len() < 2 {
        return None;
    }

    release.pop();
    let last = release.last_mut()?;
    *last = last.checked_add(1)?;

    let release = release
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".");
    Some(match version.epoch() {
        0 => release,
        epoch => format!("{epoch}!{release}"),
    })
}
