//! Content classification for captured clipboard text

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Semantic kind of a clipboard entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// Plain text
    #[default]
    Text,
    /// Absolute URL with a scheme and a host
    Url,
}

impl ContentType {
    /// Storage tag for this type
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Url => "url",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = std::convert::Infallible;

    /// Unknown tags read back as `Text`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "url" => ContentType::Url,
            _ => ContentType::Text,
        })
    }
}

/// Classify clipboard text.
///
/// Surrounding whitespace is ignored. Anything that is not an absolute URL
/// with both a scheme and a host is `Text`.
pub fn classify(text: &str) -> ContentType {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return ContentType::Text;
    }

    match Url::parse(trimmed) {
        Ok(url) if !url.scheme().is_empty() && url.host_str().is_some_and(|h| !h.is_empty()) => {
            ContentType::Url
        }
        _ => ContentType::Text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://example.com", ContentType::Url)]
    #[case("  http://example.com/path?q=1  \n", ContentType::Url)]
    #[case("ftp://files.example.org/pub", ContentType::Url)]
    #[case("mailto:someone@example.com", ContentType::Text)]
    #[case("file:///etc/hosts", ContentType::Text)]
    #[case("example.com", ContentType::Text)]
    #[case("just some words", ContentType::Text)]
    #[case("https://", ContentType::Text)]
    #[case("", ContentType::Text)]
    #[case("   ", ContentType::Text)]
    fn test_classify(#[case] input: &str, #[case] expected: ContentType) {
        assert_eq!(classify(input), expected);
    }

    #[test]
    fn test_content_type_round_trip_tags() {
        assert_eq!("url".parse::<ContentType>().unwrap(), ContentType::Url);
        assert_eq!("text".parse::<ContentType>().unwrap(), ContentType::Text);
        assert_eq!("image".parse::<ContentType>().unwrap(), ContentType::Text);
        assert_eq!(ContentType::Url.to_string(), "url");
    }
}
