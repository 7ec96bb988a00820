//! Common types used across ttk components

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum length of a credential profile name
pub const PROFILE_NAME_MAX_LEN: usize = 64;

/// Error type for profile name validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProfileNameError {
    #[error("Profile name cannot be empty")]
    Empty,
    #[error("Profile name too long (max {PROFILE_NAME_MAX_LEN} characters)")]
    TooLong,
    #[error("Profile name may not start with '.'")]
    LeadingDot,
    #[error("Profile name contains invalid characters. Only alphanumeric characters, '.', '-' and '_' are allowed")]
    InvalidCharacters,
}

/// A validated credential profile name
///
/// Profile names double as vault file stems, so they must:
/// - Be between 1 and 64 characters long
/// - Only contain alphanumeric characters, '.', '-' and '_'
/// - Not start with '.'
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProfileName(String);

impl ProfileName {
    /// Create a new validated profile name
    pub fn new(name: impl Into<String>) -> Result<Self, ProfileNameError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), ProfileNameError> {
        if name.is_empty() {
            return Err(ProfileNameError::Empty);
        }

        if name.len() > PROFILE_NAME_MAX_LEN {
            return Err(ProfileNameError::TooLong);
        }

        if name.starts_with('.') {
            return Err(ProfileNameError::LeadingDot);
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(ProfileNameError::InvalidCharacters);
        }

        Ok(())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProfileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ProfileName {
    type Err = ProfileNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ProfileName {
    type Error = ProfileNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ProfileName {
    type Error = ProfileNameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProfileName> for String {
    fn from(name: ProfileName) -> Self {
        name.0
    }
}

impl AsRef<str> for ProfileName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_name_valid() {
        assert!(ProfileName::new("default").is_ok());
        assert!(ProfileName::new("shop-id_2").is_ok());
        assert!(ProfileName::new("ads.manager").is_ok());
        assert!(ProfileName::new("a".repeat(PROFILE_NAME_MAX_LEN)).is_ok());
    }

    #[test]
    fn test_profile_name_invalid() {
        assert_eq!(ProfileName::new(""), Err(ProfileNameError::Empty));
        assert_eq!(
            ProfileName::new("a".repeat(PROFILE_NAME_MAX_LEN + 1)),
            Err(ProfileNameError::TooLong)
        );
        assert_eq!(ProfileName::new(".."), Err(ProfileNameError::LeadingDot));
        assert_eq!(ProfileName::new(".hidden"), Err(ProfileNameError::LeadingDot));
        assert_eq!(
            ProfileName::new("../etc/passwd"),
            Err(ProfileNameError::LeadingDot)
        );
        assert_eq!(
            ProfileName::new("team/alpha"),
            Err(ProfileNameError::InvalidCharacters)
        );
        assert_eq!(
            ProfileName::new("with space"),
            Err(ProfileNameError::InvalidCharacters)
        );
    }

    #[test]
    fn test_profile_name_serialization() {
        let name = ProfileName::new("default").unwrap();
        assert_eq!(serde_json::to_string(&name).unwrap(), "\"default\"");

        let parsed: ProfileName = serde_json::from_str("\"work\"").unwrap();
        assert_eq!(parsed.as_str(), "work");

        let invalid: Result<ProfileName, _> = serde_json::from_str("\"bad/name\"");
        assert!(invalid.is_err());
    }
}
