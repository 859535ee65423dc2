//! Dependency descriptors parsed from Python requirement strings such as
//! `runA > 1.2.3` or `setuptools; sys_platform != 'win32'`.
//!
//! Requirements are parsed and validated with `pep508_rs`. Version constraints are kept as text
//! under `version_*` keys; markers and URLs are recorded but never evaluated.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use pep508_rs::{Requirement, VersionOrUrl};

pub use crate::error::RequirementError;

mod error;
mod specifier;

/// A named dependency with its version constraints.
///
/// Two descriptors are equal if their names are equal: a set of descriptors holds at most one
/// entry per package, and can be queried by name.
#[derive(Debug, Clone)]
pub struct DependencyDescriptor {
    name: String,
    extras: Vec<String>,
    metadata: BTreeMap<String, String>,
    url: Option<String>,
    marker: Option<String>,
}

impl DependencyDescriptor {
    /// A dependency on any version of `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extras: Vec::new(),
            metadata: BTreeMap::new(),
            url: None,
            marker: None,
        }
    }

    /// Parse a requirement string such as `pkg[extra] >=1.0, <2; python_version < "3.9"`.
    ///
    /// Each version specifier becomes a metadata entry: `==` and `===` map to `version_eq`, `!=`
    /// to `version_neq`, `<`, `<=`, `>` and `>=` to `version_lt`, `version_lte`, `version_gt` and
    /// `version_gte`. A compatible release `~=1.4.5` becomes `version_gte = 1.4.5` and
    /// `version_lt = 1.5`.
    ///
    /// The name is kept as written, while extras and the marker are normalized.
    pub fn from_requirement(requirement: &str) -> Result<Self, RequirementError> {
        let parsed: Requirement = requirement.parse()?;

        let mut metadata = BTreeMap::new();
        let mut url = None;
        match &parsed.version_or_url {
            None => {}
            Some(VersionOrUrl::VersionSpecifier(specifiers)) => {
                for specifier in specifiers.iter() {
                    if specifier::insert_specifier(specifier, &mut metadata).is_none() {
                        return Err(RequirementError::CompatibleRelease {
                            input: requirement.to_string(),
                            version: specifier.version().to_string(),
                        });
                    }
                }
            }
            Some(VersionOrUrl::Url(verbatim)) => url = Some(verbatim.to_string()),
        }

        Ok(Self {
            name: name_as_written(requirement),
            extras: parsed.extras.iter().map(ToString::to_string).collect(),
            metadata,
            url,
            marker: parsed.marker.contents().map(|contents| contents.to_string()),
        })
    }

    /// The package name, as written.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn extras(&self) -> &[String] {
        &self.extras
    }

    /// The version constraints, keyed by `version_eq`, `version_lt` and so on.
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Returns the metadata entry for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// The direct reference of a `name @ url` requirement.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// The environment marker, verbatim and unevaluated.
    pub fn marker(&self) -> Option<&str> {
        self.marker.as_deref()
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// The leading name of a requirement that already parsed, without normalization.
fn name_as_written(requirement: &str) -> String {
    requirement
        .trim_start()
        .chars()
        .take_while(|char| char.is_ascii_alphanumeric() || matches!(char, '-' | '_' | '.'))
        .collect()
}

impl FromStr for DependencyDescriptor {
    type Err = RequirementError;

    fn from_str(requirement: &str) -> Result<Self, Self::Err> {
        Self::from_requirement(requirement)
    }
}

impl PartialEq for DependencyDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for DependencyDescriptor {}

impl Hash for DependencyDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl Borrow<str> for DependencyDescriptor {
    fn borrow(&self) -> &str {
        &self.name
    }
}

impl Display for DependencyDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{DependencyDescriptor, RequirementError};

    fn parse(requirement: &str) -> DependencyDescriptor {
        DependencyDescriptor::from_requirement(requirement).unwrap()
    }

    fn parse_err(requirement: &str) -> RequirementError {
        DependencyDescriptor::from_requirement(requirement).unwrap_err()
    }

    fn metadata(dependency: &DependencyDescriptor) -> Vec<(&str, &str)> {
        dependency
            .metadata()
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect()
    }

    #[test]
    fn name_only() {
        let dependency = parse("  runB ");
        assert_eq!(dependency.name(), "runB");
        assert!(dependency.metadata().is_empty());
        assert_eq!(dependency.marker(), None);
        assert_eq!(parse("a").name(), "a");
        assert_eq!(parse("zope.interface").name(), "zope.interface");
        assert_eq!(parse("Flask_SQLAlchemy>=2").name(), "Flask_SQLAlchemy");
    }

    #[test]
    fn greater_than() {
        let dependency = parse("runA > 1.2.3");
        assert_eq!(dependency.name(), "runA");
        assert_eq!(metadata(&dependency), [("version_gt", "1.2.3")]);
    }

    #[test]
    fn all_operators() {
        let dependency = parse("pkg==1.0,!=1.1,<3,<=2.9,>0.1,>=0.2");
        assert_eq!(
            metadata(&dependency),
            [
                ("version_eq", "1.0"),
                ("version_gt", "0.1"),
                ("version_gte", "0.2"),
                ("version_lt", "3"),
                ("version_lte", "2.9"),
                ("version_neq", "1.1"),
            ]
        );
        assert_eq!(metadata(&parse("pkg===1.0")), [("version_eq", "1.0")]);
    }

    #[test]
    fn compatible_release() {
        assert_eq!(
            metadata(&parse("pkg ~= 1.4.5")),
            [("version_gte", "1.4.5"), ("version_lt", "1.5")]
        );
        assert_eq!(
            metadata(&parse("pkg~=2.2")),
            [("version_gte", "2.2"), ("version_lt", "3")]
        );
    }

    #[test]
    fn compatible_release_out_of_range() {
        let err = parse_err("pkg ~= 18446744073709551615.0");
        assert!(
            matches!(err, RequirementError::CompatibleRelease { .. }),
            "{err}"
        );
        assert_eq!(err.input(), "pkg ~= 18446744073709551615.0");
    }

    #[test]
    fn wildcard() {
        assert_eq!(metadata(&parse("pkg == 1.*")), [("version_eq", "1.*")]);
        assert_eq!(metadata(&parse("pkg != 1.2.*")), [("version_neq", "1.2.*")]);
    }

    #[test]
    fn parenthesized() {
        let dependency = parse("pkg (>=1.0, <2)");
        assert_eq!(
            metadata(&dependency),
            [("version_gte", "1.0"), ("version_lt", "2")]
        );
    }

    #[test]
    fn marker() {
        let dependency = parse("setuptools; sys_platform != 'win32'");
        assert_eq!(dependency.name(), "setuptools");
        assert_eq!(dependency.marker(), Some("sys_platform != 'win32'"));
        assert!(dependency.metadata().is_empty());

        let dependency =
            parse(r#"colcon-core>=0.5 ; sys_platform == "win32" and os_name == "nt""#);
        assert_eq!(metadata(&dependency), [("version_gte", "0.5")]);
        let marker = dependency.marker().unwrap();
        assert!(marker.contains("sys_platform == 'win32'"), "{marker}");
        assert!(marker.contains("os_name == 'nt'"), "{marker}");
    }

    #[test]
    fn invalid_marker() {
        let err = parse_err("runA; not a marker ((");
        assert!(matches!(err, RequirementError::Parse(_)), "{err}");
        assert_eq!(err.input(), "runA; not a marker ((");
        assert!(err.span().start >= "runA;".len(), "{:?}", err.span());
    }

    #[test]
    fn extras() {
        let dependency = parse("pkg[ security , tests]>=2");
        assert_eq!(dependency.extras(), ["security", "tests"]);
        assert_eq!(metadata(&dependency), [("version_gte", "2")]);
        assert!(parse("pkg[]").extras().is_empty());
    }

    #[test]
    fn url() {
        let dependency =
            parse("pkg[extra] @ https://example.com/pkg-1.0.tar.gz ; os_name == 'nt'");
        assert_eq!(dependency.url(), Some("https://example.com/pkg-1.0.tar.gz"));
        assert_eq!(dependency.extras(), ["extra"]);
        assert_eq!(dependency.marker(), Some("os_name == 'nt'"));
        assert!(dependency.metadata().is_empty());
    }

    #[test]
    fn invalid_requirements() {
        for requirement in [
            "",
            "   ",
            "-pkg",
            "pkg >",
            "pkg => 1.0",
            "pkg >=1.0,",
            "pkg (>=1.0",
            "pkg[extra",
            "pkg >= 1;",
            "pkg $",
            "pkg >= 1.0 2.0",
            "pkg >= 1.*",
            "pkg ~= 1",
        ] {
            let err = parse_err(requirement);
            assert!(matches!(err, RequirementError::Parse(_)), "{requirement}: {err}");
            assert_eq!(err.input(), requirement);
        }
    }

    #[test]
    fn error_underlines_the_input() {
        let message = parse_err("pkg => 1.0").to_string();
        let lines: Vec<&str> = message.lines().collect();
        assert!(lines.contains(&"pkg => 1.0"), "{message}");
        assert!(lines.last().is_some_and(|line| line.trim_start().starts_with('^')));
    }

    #[test]
    fn equal_by_name() {
        let loose = DependencyDescriptor::from_requirement("runA").unwrap();
        let strict = DependencyDescriptor::from_requirement("runA > 1.2.3").unwrap();
        assert_eq!(loose, strict);
        assert_ne!(loose.metadata(), strict.metadata());
        assert_ne!(loose, DependencyDescriptor::new("runB"));
    }

    #[test]
    fn set_keeps_the_first_descriptor() {
        let dependencies: HashSet<DependencyDescriptor> = ["runA > 1.2.3", "runB", "runA"]
            .into_iter()
            .map(|requirement| DependencyDescriptor::from_requirement(requirement).unwrap())
            .collect();
        assert_eq!(dependencies.len(), 2);

        let run_a = dependencies.get("runA").unwrap();
        assert_eq!(run_a.get("version_gt"), Some("1.2.3"));
        assert!(dependencies.contains("runB"));
        assert!(!dependencies.contains("runC"));
    }

    #[test]
    fn display_is_the_name() {
        let dependency = DependencyDescriptor::from_requirement("pkg[extra] >= 1").unwrap();
        assert_eq!(dependency.to_string(), "pkg");
    }

    #[test]
    fn builder() {
        let dependency = DependencyDescriptor::new("pkg").with_metadata("version_gte", "1.0");
        assert_eq!(dependency.name(), "pkg");
        assert_eq!(dependency.get("version_gte"), Some("1.0"));
        assert!(dependency.extras().is_empty());
        assert_eq!(dependency.url(), None);
        assert_eq!(dependency.marker(), None);
    }
}
