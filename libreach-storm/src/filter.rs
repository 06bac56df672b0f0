use std::{io, path::Path};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Failed to read domain filter {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Allowed top level domain suffixes, each stored as `.<label>/`.
///
/// An empty set rejects every domain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    patterns: Vec<String>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, FilterError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| FilterError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Ok(Self::parse(&content))
    }

    pub fn parse(content: &str) -> Self {
        content.lines().collect()
    }

    /// Returns true if `domain`, with a trailing `/` appended when missing,
    /// ends with any of the patterns. Case-sensitive.
    pub fn matches(&self, domain: &str) -> bool {
        let candidate = with_trailing_slash(domain);
        self.patterns
            .iter()
            .any(|pattern| candidate.ends_with(pattern.as_str()))
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for FilterSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let patterns = iter
            .into_iter()
            .filter(|line| !line.as_ref().is_empty())
            .map(|line| normalize_pattern(line.as_ref()))
            .collect();

        Self { patterns }
    }
}

/// Forces a leading `.` and a trailing `/` onto a filter line.
pub fn normalize_pattern(line: &str) -> String {
    let mut pattern = String::with_capacity(line.len() + 2);
    if !line.starts_with('.') {
        pattern.push('.');
    }
    pattern.push_str(line);
    if !pattern.ends_with('/') {
        pattern.push('/');
    }
    pattern
}

pub(crate) fn with_trailing_slash(domain: &str) -> String {
    if domain.ends_with('/') {
        domain.to_string()
    } else {
        format!("{}/", domain)
    }
}
