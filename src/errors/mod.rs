//! Error types surfaced by the client.
//!
//! Everything the pipeline can raise funnels into [`RedditError`]. API-level
//! failures decoded from a response body keep their reddit error type string
//! so callers can recover programmatically.

use std::fmt;

/// A single entry from the `errors` list of a `{"json": {...}}` envelope.
///
/// Reddit reports these as `[type, message, field]` triples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub error_type: String,
    pub message: String,
    pub field: String,
}

impl ApiError {
    pub fn new(error_type: &str, message: &str, field: &str) -> Self {
        Self {
            error_type: error_type.to_string(),
            message: message.to_string(),
            field: field.to_string(),
        }
    }

    /// Classify the error type string into a known kind.
    pub fn kind(&self) -> ApiErrorKind {
        match self.error_type.as_str() {
            "RATELIMIT" => ApiErrorKind::RateLimit,
            "INVALID_USER" => ApiErrorKind::InvalidUser,
            "ALREADY_SUB" | "ALREADY_SUBMITTED" => ApiErrorKind::AlreadySubmitted,
            "BAD_CAPTCHA" => ApiErrorKind::BadCaptcha,
            "ALREADY_MODERATOR" => ApiErrorKind::AlreadyModerator,
            "SUBREDDIT_EXISTS" => ApiErrorKind::SubredditExists,
            "BAD_CSS" | "BAD_CSS_NAME" => ApiErrorKind::BadCss,
            "INVALID_FLAIR_TARGET" => ApiErrorKind::InvalidFlairTarget,
            "INVALID_INVITE" => ApiErrorKind::InvalidInvite,
            "NOT_FOUND" => ApiErrorKind::NotFound,
            "FORBIDDEN" => ApiErrorKind::Forbidden,
            _ => ApiErrorKind::Other,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.field.is_empty() {
            write!(f, "{}: {}", self.error_type, self.message)
        } else {
            write!(f, "{}: {} (field: {})", self.error_type, self.message, self.field)
        }
    }
}

/// Known reddit API error types. Anything unrecognised maps to `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    RateLimit,
    InvalidUser,
    AlreadySubmitted,
    BadCaptcha,
    AlreadyModerator,
    SubredditExists,
    BadCss,
    InvalidFlairTarget,
    InvalidInvite,
    NotFound,
    Forbidden,
    Other,
}

// Custom error type covering client, OAuth, transport, and API failures
#[derive(Debug)]
pub enum RedditError {
    /// Bad input or invalid use of the client, detected before any request.
    Client(String),
    /// A configuration value was consumed while unset.
    ConfigMissing(String),
    /// An OAuth operation was attempted without client credentials configured.
    AppRequired(String),
    /// The token endpoint rejected the grant (revoked or bad refresh token).
    InvalidGrant { url: String },
    /// The server rejected the bearer and a refresh did not help.
    InvalidToken { url: String },
    /// The server declared the bearer's scopes insufficient for the request.
    InsufficientScope { url: String },
    /// The current scope set does not cover the scopes a call requires.
    /// Raised before any request is dispatched.
    ScopeRequired { required: String, url: Option<String> },
    /// Any other OAuth failure, with the URL that produced it.
    OAuth { message: String, url: String },
    /// Non-success HTTP status that is not handled by a more specific variant.
    Http { status: u16, url: String, body: String },
    /// A single API-level error decoded from a response body.
    Api(ApiError),
    /// Several API-level errors from one response.
    ApiList(Vec<ApiError>),
    /// A 302 pointed somewhere the pipeline did not expect.
    Redirect { request_url: String, location: String },
    /// The server redirected to a subreddit search, meaning the subreddit
    /// does not exist.
    InvalidSubreddit { url: String },
    /// The body carried `"error": 304`.
    NotModified,
    RequestError(reqwest::Error),
    ParseError(serde_json::Error),
}

impl RedditError {
    /// Collapse a decoded `errors` list into the right variant: one entry
    /// raises directly, several aggregate.
    pub fn from_api_errors(mut errors: Vec<ApiError>) -> Self {
        if errors.len() == 1 {
            RedditError::Api(errors.remove(0))
        } else {
            RedditError::ApiList(errors)
        }
    }
}

impl fmt::Display for RedditError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RedditError::Client(msg) => write!(f, "Client error: {}", msg),
            RedditError::ConfigMissing(key) => {
                write!(f, "Configuration value '{}' is not set", key)
            }
            RedditError::AppRequired(msg) => {
                write!(f, "OAuth client configuration required: {}", msg)
            }
            RedditError::InvalidGrant { url } => {
                write!(f, "Invalid grant at {}", url)
            }
            RedditError::InvalidToken { url } => {
                write!(f, "Invalid bearer token at {}", url)
            }
            RedditError::InsufficientScope { url } => {
                write!(f, "Insufficient scope for {}", url)
            }
            RedditError::ScopeRequired { required, url } => match url {
                Some(url) => write!(f, "Scope '{}' required for {}", required, url),
                None => write!(f, "Scope '{}' required", required),
            },
            RedditError::OAuth { message, url } => {
                write!(f, "OAuth error at {}: {}", url, message)
            }
            RedditError::Http { status, url, .. } => {
                write!(f, "HTTP {} from {}", status, url)
            }
            RedditError::Api(err) => write!(f, "Reddit API error: {}", err),
            RedditError::ApiList(errors) => {
                write!(f, "Reddit API returned {} errors:", errors.len())?;
                for (i, err) in errors.iter().enumerate() {
                    write!(f, " [{}] {}", i, err)?;
                }
                Ok(())
            }
            RedditError::Redirect { request_url, location } => {
                write!(f, "Unexpected redirect from {} to {}", request_url, location)
            }
            RedditError::InvalidSubreddit { url } => {
                write!(f, "Subreddit does not exist: {}", url)
            }
            RedditError::NotModified => write!(f, "Content has not been modified"),
            RedditError::RequestError(err) => write!(f, "Request error: {}", err),
            RedditError::ParseError(err) => write!(f, "Parse error: {}", err),
        }
    }
}

impl std::error::Error for RedditError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RedditError::RequestError(err) => Some(err),
            RedditError::ParseError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for RedditError {
    fn from(err: reqwest::Error) -> Self {
        RedditError::RequestError(err)
    }
}

impl From<serde_json::Error> for RedditError {
    fn from(err: serde_json::Error) -> Self {
        RedditError::ParseError(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_kind_maps_known_types() {
        assert_eq!(
            ApiError::new("RATELIMIT", "slow down", "").kind(),
            ApiErrorKind::RateLimit
        );
        assert_eq!(
            ApiError::new("ALREADY_SUBMITTED", "already submitted", "url").kind(),
            ApiErrorKind::AlreadySubmitted
        );
        assert_eq!(
            ApiError::new("SOME_FUTURE_TYPE", "?", "").kind(),
            ApiErrorKind::Other
        );
    }

    #[test]
    fn single_error_raises_directly() {
        let err = RedditError::from_api_errors(vec![ApiError::new("BAD_CAPTCHA", "care to try these again?", "captcha")]);
        match err {
            RedditError::Api(inner) => assert_eq!(inner.kind(), ApiErrorKind::BadCaptcha),
            other => panic!("expected Api, got {:?}", other),
        }
    }

    #[test]
    fn multiple_errors_aggregate() {
        let err = RedditError::from_api_errors(vec![
            ApiError::new("BAD_CAPTCHA", "try again", "captcha"),
            ApiError::new("NO_TEXT", "we need something here", "title"),
        ]);
        match err {
            RedditError::ApiList(list) => assert_eq!(list.len(), 2),
            other => panic!("expected ApiList, got {:?}", other),
        }
    }
}
