//! Static API key check gating the mutating endpoint.
//!
//! A missing or empty configured key disables authentication entirely.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

pub fn parse_api_key(raw: &str) -> Option<ApiKey> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    Some(ApiKey(raw.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    MissingKey,
    InvalidKey,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingKey => {
                write!(f, "API key is required. Please provide X-API-KEY header.")
            }
            Self::InvalidKey => write!(f, "Invalid API key."),
        }
    }
}

impl std::error::Error for AuthError {}

/// Pure function of (configured key, provided header value); no state, no
/// side effects.
pub fn check_api_key(configured: Option<&ApiKey>, provided: Option<&str>) -> Result<(), AuthError> {
    let Some(expected) = configured else {
        return Ok(());
    };
    match provided {
        None => Err(AuthError::MissingKey),
        Some(key) if key == expected.as_str() => Ok(()),
        Some(_) => Err(AuthError::InvalidKey),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_everything_when_no_key_is_configured() {
        assert_eq!(check_api_key(None, None), Ok(()));
        assert_eq!(check_api_key(None, Some("anything")), Ok(()));
    }

    #[test]
    fn rejects_missing_header_when_key_is_configured() {
        let key = parse_api_key("sekrit").unwrap();
        assert_eq!(check_api_key(Some(&key), None), Err(AuthError::MissingKey));
    }

    #[test]
    fn rejects_wrong_key() {
        let key = parse_api_key("sekrit").unwrap();
        assert_eq!(
            check_api_key(Some(&key), Some("wrong")),
            Err(AuthError::InvalidKey)
        );
    }

    #[test]
    fn accepts_matching_key() {
        let key = parse_api_key("sekrit").unwrap();
        assert_eq!(check_api_key(Some(&key), Some("sekrit")), Ok(()));
    }

    #[test]
    fn parse_rejects_empty_and_whitespace() {
        assert!(parse_api_key("").is_none());
        assert!(parse_api_key("  \t ").is_none());
        assert_eq!(parse_api_key(" k ").unwrap().as_str(), "k");
    }
}
