use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// An external social-media platform the engine can ingest posts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    TikTok,
    Instagram,
    YouTube,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::TikTok, Provider::Instagram, Provider::YouTube];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::TikTok => "tiktok",
            Provider::Instagram => "instagram",
            Provider::YouTube => "youtube",
        }
    }

    /// Tag attached to every cache entry that belongs to this provider.
    #[must_use]
    pub fn platform_tag(self) -> String {
        format!("platform:{}", self.as_str())
    }

    /// Tag scoping a cache entry to one user on this provider.
    #[must_use]
    pub fn user_tag(self, user_id: &str) -> String {
        format!("{}:user:{user_id}", self.as_str())
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tiktok" => Ok(Provider::TikTok),
            "instagram" => Ok(Provider::Instagram),
            "youtube" => Ok(Provider::YouTube),
            other => Err(IngestError::Validation(format!("unknown provider \"{other}\""))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("TikTok".parse::<Provider>().unwrap(), Provider::TikTok);
        assert_eq!(" youtube ".parse::<Provider>().unwrap(), Provider::YouTube);
    }

    #[test]
    fn rejects_unknown_provider() {
        let err = "myspace".parse::<Provider>().unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&Provider::YouTube).unwrap();
        assert_eq!(json, "\"youtube\"");
        let back: Provider = serde_json::from_str("\"tiktok\"").unwrap();
        assert_eq!(back, Provider::TikTok);
    }

    #[test]
    fn tags_are_scoped_by_provider() {
        assert_eq!(Provider::Instagram.platform_tag(), "platform:instagram");
        assert_eq!(Provider::Instagram.user_tag("42"), "instagram:user:42");
    }
}
