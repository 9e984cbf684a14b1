//! `REPOSITORY:TAG` image references

use crate::error::ParseError;
use std::fmt;
use std::str::FromStr;

/// Suffix appended to the repository name of a canonicalized image
pub const CANONICAL_SUFFIX: &str = "-canoni";

const DEFAULT_REGISTRY: &str = "docker.io";

/// A parsed `repository:tag` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    repository: String,
    tag: String,
}

impl Reference {
    /// Parse a reference containing exactly one `:` between a non-empty
    /// repository and a non-empty tag
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let invalid = || ParseError::InvalidFormat(input.to_string());

        if input.chars().any(char::is_whitespace) {
            return Err(invalid());
        }

        let mut parts = input.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(repository), Some(tag), None) if !repository.is_empty() && !tag.is_empty() => {
                Ok(Self {
                    repository: repository.to_string(),
                    tag: tag.to_string(),
                })
            }
            _ => Err(invalid()),
        }
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Name under which the canonicalized image is stored, so it never
    /// collides with the source image
    pub fn canonical(&self) -> Self {
        Self {
            repository: format!("{}{}", self.repository, CANONICAL_SUFFIX),
            tag: self.tag.clone(),
        }
    }

    /// Fully qualified name as a container engine normalizes it, e.g.
    /// `myapp:v1` becomes `docker.io/library/myapp:v1`
    pub fn qualified(&self) -> String {
        let repository = match self.repository.split_once('/') {
            None => format!("{}/library/{}", DEFAULT_REGISTRY, self.repository),
            Some((first, _)) if first.contains('.') || first == "localhost" => {
                self.repository.clone()
            }
            Some(_) => format!("{}/{}", DEFAULT_REGISTRY, self.repository),
        };
        format!("{}:{}", repository, self.tag)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

impl FromStr for Reference {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Reference::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_canonical() {
        let reference = Reference::parse("myapp:v1").unwrap();
        assert_eq!(reference.repository(), "myapp");
        assert_eq!(reference.tag(), "v1");

        let canonical = reference.canonical();
        assert_eq!(canonical.repository(), "myapp-canoni");
        assert_eq!(canonical.tag(), "v1");
        assert_eq!(canonical.to_string(), "myapp-canoni:v1");
    }

    #[test]
    fn test_invalid_formats() {
        for input in ["bad", "a:b:c", ":v1", "myapp:", ":", "", "my app:v1"] {
            assert_eq!(
                Reference::parse(input),
                Err(ParseError::InvalidFormat(input.to_string())),
                "{:?} should be rejected",
                input
            );
        }
    }

    #[test]
    fn test_repository_with_path() {
        let reference: Reference = "team/service:2024.01".parse().unwrap();
        assert_eq!(reference.repository(), "team/service");
        assert_eq!(reference.canonical().to_string(), "team/service-canoni:2024.01");
    }

    #[test]
    fn test_qualified_names() {
        assert_eq!(
            Reference::parse("myapp:v1").unwrap().qualified(),
            "docker.io/library/myapp:v1"
        );
        assert_eq!(
            Reference::parse("team/app:v1").unwrap().qualified(),
            "docker.io/team/app:v1"
        );
        assert_eq!(
            Reference::parse("ghcr.io/team/app:v1").unwrap().qualified(),
            "ghcr.io/team/app:v1"
        );
        assert_eq!(
            Reference::parse("localhost/app:v1").unwrap().qualified(),
            "localhost/app:v1"
        );
    }
}
