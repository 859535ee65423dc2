use std::ops::Range;

use pep508_rs::Pep508Error;
use thiserror::Error;

/// A requirement string that couldn't be turned into a dependency descriptor.
#[derive(Debug, Error)]
pub enum RequirementError {
    /// The string is not a valid PEP 508 requirement; the message underlines the offending span.
    #[error(transparent)]
    Parse(Box<Pep508Error>),
    /// The upper bound of a `~=` specifier doesn't fit into a release segment.
    #[error("The upper bound of `~={version}` is out of range\n{input}")]
    CompatibleRelease { input: String, version: String },
}

impl RequirementError {
    /// The requirement string that failed to parse.
    pub fn input(&self) -> &str {
        match self {
            Self::Parse(err) => &err.input,
            Self::CompatibleRelease { input, .. } => input,
        }
    }

    /// The byte range of the input the error points at.
    pub fn span(&self) -> Range<usize> {
        match self {
            Self::Parse(err) => err.start..err.start + err.len,
            Self::CompatibleRelease { input, .. } => 0..input.len(),
        }
    }
}

impl From<Pep508Error> for RequirementError {
    fn from(err: Pep508Error) -> Self {
        Self::Parse(Box::new(err))
    }
}
