//! OAuth2 grant state machine.
//!
//! The [`Authorizer`] owns the bearer token, its expiry, and the scope set,
//! and knows how to obtain or renew tokens for each grant mode: resource
//! owner (script apps), refresh token, and the two application-only grants.
//! All token-endpoint traffic goes to `{reddit_url}/api/v1/access_token`
//! with HTTP basic auth of `(client_id, client_secret)`.

pub mod interactive;
pub mod managers;

use std::collections::HashSet;

use log::debug;
use reqwest::Client;

use crate::config::Config;
use crate::errors::RedditError;

pub use managers::{FileTokenManager, SqliteTokenManager, TokenManager};

/// Scope sentinel meaning "all scopes".
pub const ALL_SCOPES: &str = "*";

/// Rate-limit key used for requests carrying no bearer.
pub const UNAUTHENTICATED: &str = "<unauthenticated>";

/// Bearers within this many seconds of expiry are refreshed preemptively.
const EXPIRY_MARGIN_SECS: u64 = 300;

const INSTALLED_CLIENT_GRANT: &str = "https://oauth.reddit.com/grants/installed_client";
const DEVICE_ID: &str = "DO_NOT_TRACK_THIS_DEVICE";

/// How the next token will be obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantKind {
    /// No way to obtain a token; requests go out unauthenticated.
    None,
    /// Script app with username and password.
    ResourceOwner,
    /// Permanent refresh token from a prior code exchange.
    RefreshToken,
    /// Installed app without a user context.
    InstalledClient,
    /// Web or script app without a user context.
    ClientCredentials,
}

impl GrantKind {
    /// Whether tokens from this grant carry a user context.
    pub fn has_user_context(&self) -> bool {
        matches!(self, GrantKind::ResourceOwner | GrantKind::RefreshToken)
    }
}

pub struct Authorizer {
    config: Config,
    grant: GrantKind,
    /// The grant the session was constructed with, so read-only mode can be
    /// toggled back off.
    configured_grant: GrantKind,
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<u64>,
    scopes: Option<HashSet<String>>,
    token_manager: Option<Box<dyn TokenManager>>,
}

impl Authorizer {
    /// Pick the initial grant mode from the configured credentials.
    pub fn new(config: Config) -> Self {
        let grant = if config.refresh_token.is_some() {
            GrantKind::RefreshToken
        } else if config.username.is_some() && config.password.is_some() {
            GrantKind::ResourceOwner
        } else if config.client_secret.is_some() {
            GrantKind::ClientCredentials
        } else if config.client_id.is_some() {
            GrantKind::InstalledClient
        } else {
            GrantKind::None
        };
        debug!("Authorizer starting in grant mode {:?}", grant);

        let refresh_token = config.refresh_token.clone();
        Self {
            config,
            configured_grant: grant.clone(),
            grant,
            access_token: None,
            refresh_token,
            expires_at: None,
            scopes: None,
            token_manager: None,
        }
    }

    pub fn grant(&self) -> &GrantKind {
        &self.grant
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn set_refresh_token(&mut self, token: Option<String>) {
        self.refresh_token = token;
    }

    pub fn scopes(&self) -> Option<&HashSet<String>> {
        self.scopes.as_ref()
    }

    /// Bind a token manager. Binding a second one fails.
    pub fn set_token_manager(
        &mut self,
        manager: Box<dyn TokenManager>,
    ) -> Result<(), RedditError> {
        if self.token_manager.is_some() {
            return Err(RedditError::Client(
                "A token manager is already bound to this session".to_string(),
            ));
        }
        // A manager implies tokens will arrive by refresh.
        if self.grant == GrantKind::None || !self.grant.has_user_context() {
            self.grant = GrantKind::RefreshToken;
            self.configured_grant = GrantKind::RefreshToken;
        }
        self.token_manager = Some(manager);
        Ok(())
    }

    /// Whether the current token is present and not within the expiry margin.
    pub fn is_valid(&self) -> bool {
        match (self.access_token.as_ref(), self.expires_at) {
            (Some(_), Some(expiry)) => now_secs() + EXPIRY_MARGIN_SECS < expiry,
            _ => false,
        }
    }

    /// Identity used for rate-limit and cache keys.
    pub fn bearer_id(&self) -> String {
        match &self.access_token {
            Some(token) => token.clone(),
            None => UNAUTHENTICATED.to_string(),
        }
    }

    /// Whether the current scope set covers all the given scopes.
    pub fn scopes_cover(&self, required: &[&str]) -> bool {
        match &self.scopes {
            // No token established yet; the fetch will declare scopes.
            None => true,
            Some(scopes) => {
                scopes.contains(ALL_SCOPES)
                    || required.iter().all(|scope| scopes.contains(*scope))
            }
        }
    }

    /// Force or lift read-only mode. Lifting it on a session that never had
    /// user credentials fails.
    pub fn force_read_only(&mut self, read_only: bool) -> Result<(), RedditError> {
        if read_only {
            if self.grant.has_user_context() {
                self.grant = if self.config.client_secret.is_some() {
                    GrantKind::ClientCredentials
                } else {
                    GrantKind::InstalledClient
                };
                self.invalidate();
            }
            Ok(())
        } else if self.configured_grant.has_user_context() {
            if !self.grant.has_user_context() {
                self.grant = self.configured_grant.clone();
                self.invalidate();
            }
            Ok(())
        } else {
            Err(RedditError::Client(
                "read_only cannot be unset on a session without user credentials".to_string(),
            ))
        }
    }

    pub fn is_read_only(&self) -> bool {
        !self.grant.has_user_context()
    }

    /// Drop the current bearer so the next request must fetch a new one.
    pub fn invalidate(&mut self) {
        self.access_token = None;
        self.expires_at = None;
        self.scopes = None;
    }

    /// Produce a valid bearer for the next request, renewing if the current
    /// one is missing or expiring. `Ok(None)` means the request goes out
    /// unauthenticated.
    pub async fn ensure_token(&mut self, http: &Client) -> Result<Option<String>, RedditError> {
        if self.grant == GrantKind::None {
            return Ok(None);
        }
        if self.is_valid() {
            return Ok(self.access_token.clone());
        }
        self.refresh(http).await?;
        Ok(self.access_token.clone())
    }

    /// Request new tokens for the current grant mode, driving the token
    /// manager callbacks around the exchange.
    pub async fn refresh(&mut self, http: &Client) -> Result<(), RedditError> {
        if let Some(manager) = self.token_manager.take() {
            let result = manager.pre_refresh(self);
            self.token_manager = Some(manager);
            result?;
        }

        let refresh_token = self.refresh_token.clone();
        let params: Vec<(&str, &str)> = match &self.grant {
            GrantKind::None => {
                return Err(RedditError::AppRequired(
                    "no grant mode available to obtain a token".to_string(),
                ))
            }
            GrantKind::ResourceOwner => {
                let username = self.config.username.as_deref().ok_or_else(|| {
                    RedditError::Client("username required for the password grant".to_string())
                })?;
                let password = self.config.password.as_deref().ok_or_else(|| {
                    RedditError::Client("password required for the password grant".to_string())
                })?;
                vec![
                    ("grant_type", "password"),
                    ("username", username),
                    ("password", password),
                ]
            }
            GrantKind::RefreshToken => {
                let token = refresh_token.as_deref().ok_or_else(|| {
                    RedditError::Client("No refresh token available".to_string())
                })?;
                vec![("grant_type", "refresh_token"), ("refresh_token", token)]
            }
            GrantKind::InstalledClient => vec![
                ("grant_type", INSTALLED_CLIENT_GRANT),
                ("device_id", DEVICE_ID),
            ],
            GrantKind::ClientCredentials => vec![("grant_type", "client_credentials")],
        };

        let json = self.token_request(http, &params).await?;
        self.absorb_token_response(&json)?;

        if let Some(manager) = self.token_manager.take() {
            let result = manager.post_refresh(self);
            self.token_manager = Some(manager);
            result?;
        }

        debug!("Access token obtained via {:?} grant", self.grant);
        Ok(())
    }

    /// Exchange an authorization code obtained from the authorize URL. On
    /// success the session continues in refresh-token mode when the server
    /// issued one.
    pub async fn exchange_code(&mut self, http: &Client, code: &str) -> Result<(), RedditError> {
        let redirect_uri = self.config.redirect_uri.clone().ok_or_else(|| {
            RedditError::Client("redirect_uri required to exchange a code".to_string())
        })?;
        let params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
        ];
        let json = self.token_request(http, &params).await?;
        self.absorb_token_response(&json)?;

        if self.refresh_token.is_some() {
            self.grant = GrantKind::RefreshToken;
            self.configured_grant = GrantKind::RefreshToken;
            if let Some(manager) = self.token_manager.take() {
                let result = manager.post_refresh(self);
                self.token_manager = Some(manager);
                result?;
            }
        }
        Ok(())
    }

    /// Build the URL a user visits to authorize this client.
    pub fn authorize_url(
        &self,
        duration: &str,
        scopes: &[&str],
        state: &str,
    ) -> Result<String, RedditError> {
        let client_id = self.client_id()?;
        let redirect_uri = self.config.redirect_uri.as_deref().ok_or_else(|| {
            RedditError::Client("redirect_uri required to build an authorize URL".to_string())
        })?;

        let base = format!("{}/api/v1/authorize", self.config.reddit_url);
        let scope = scopes.join(" ");
        let url = url::Url::parse_with_params(
            &base,
            &[
                ("client_id", client_id),
                ("duration", duration),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| RedditError::Client(format!("Invalid authorize URL: {}", e)))?;
        Ok(url.into())
    }

    fn client_id(&self) -> Result<&str, RedditError> {
        self.config.client_id.as_deref().ok_or_else(|| {
            RedditError::AppRequired("client_id is not configured".to_string())
        })
    }

    /// POST to the token endpoint with basic auth. The secret defaults to
    /// empty for installed apps.
    async fn token_request(
        &self,
        http: &Client,
        params: &[(&str, &str)],
    ) -> Result<serde_json::Value, RedditError> {
        let url = format!("{}/api/v1/access_token", self.config.reddit_url);
        let client_id = self.client_id()?;
        let secret = self.config.client_secret.as_deref().unwrap_or("");
        let auth = base64::encode(format!("{}:{}", client_id, secret));

        let res = http
            .post(&url)
            .header("Authorization", format!("Basic {}", auth))
            .form(params)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() && status.as_u16() != 400 {
            let body = res.text().await.unwrap_or_default();
            return Err(RedditError::OAuth {
                message: format!("token endpoint returned HTTP {}: {}", status, body),
                url,
            });
        }

        let json: serde_json::Value = res.json().await?;
        if let Some(error) = json["error"].as_str() {
            return Err(match error {
                "invalid_grant" => RedditError::InvalidGrant { url },
                other => RedditError::OAuth {
                    message: other.to_string(),
                    url,
                },
            });
        }
        Ok(json)
    }

    /// Pull token, expiry, scope, and an optional new refresh token out of a
    /// token-endpoint response.
    fn absorb_token_response(&mut self, json: &serde_json::Value) -> Result<(), RedditError> {
        let token = json["access_token"]
            .as_str()
            .ok_or_else(|| RedditError::OAuth {
                message: "Failed to extract access token from response".to_string(),
                url: format!("{}/api/v1/access_token", self.config.reddit_url),
            })?
            .to_string();

        let expires_in = json["expires_in"].as_u64().unwrap_or(3600);
        self.expires_at = Some(now_secs() + expires_in);
        self.access_token = Some(token);

        self.scopes = json["scope"].as_str().map(|scope| {
            scope
                .split(|c| c == ' ' || c == ',')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect::<HashSet<_>>()
        });

        if let Some(new_refresh) = json["refresh_token"].as_str() {
            debug!("Received a new refresh token");
            self.refresh_token = Some(new_refresh.to_string());
        }
        Ok(())
    }
}

fn now_secs() -> u64 {
    chrono::Utc::now().timestamp() as u64
}
