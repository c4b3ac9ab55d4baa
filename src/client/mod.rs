//! The session type and its request pipeline.
//!
//! [`RedditClient`] composes the configuration, the OAuth2 authorizer, the
//! pacing-and-cache handler, and the object registry into a single fetch
//! path. Every call, whether issued directly or by an entity's lazy load,
//! runs the same sequence: resolve the endpoint, probe the cache, gate on
//! scopes, pace, dispatch, handle redirects and auth errors, retry
//! transient failures, decode, and materialise typed objects.

pub mod cache;
pub mod handler;
pub mod ratelimit;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use reqwest::header::{AUTHORIZATION, LOCATION, WWW_AUTHENTICATE};
use reqwest::{Method, Proxy};
use serde_json::Value;

use crate::auth::{interactive, Authorizer, TokenManager, UNAUTHENTICATED};
use crate::config::Config;
use crate::errors::{ApiError, RedditError};
use crate::listing::{ListingGenerator, ListingStream};
use crate::models::{Registry, Subreddit, Thing};

use cache::{CachedResponse, RequestKey};
use handler::Handler;

/// Default freshness window for cached safe responses.
const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_secs(30);

/// Total dispatch attempts for transient failures, counting the first.
const MAX_ATTEMPTS: u32 = 3;

/// A logical request before the pipeline resolves it.
#[derive(Debug, Clone)]
pub struct Call {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    form: Vec<(String, String)>,
    required_scopes: Vec<String>,
    cache_ignore: bool,
    cache_timeout: Option<Duration>,
    follow_redirect: bool,
    timeout: Option<f64>,
}

impl Call {
    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: &str) -> Self {
        Self::new(Method::POST, path)
    }

    fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            query: Vec::new(),
            form: Vec::new(),
            required_scopes: Vec::new(),
            cache_ignore: false,
            cache_timeout: None,
            follow_redirect: false,
            timeout: None,
        }
    }

    pub fn query(mut self, params: &[(String, String)]) -> Self {
        self.query.extend(params.iter().cloned());
        self
    }

    pub fn form(mut self, params: &[(String, String)]) -> Self {
        self.form.extend(params.iter().cloned());
        self
    }

    /// Scopes the bearer must hold; checked before any request is sent.
    pub fn scopes(mut self, scopes: &[&str]) -> Self {
        self.required_scopes = scopes.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Skip the cache probe for this call. The response is still stored.
    pub fn cache_ignore(mut self) -> Self {
        self.cache_ignore = true;
        self
    }

    /// Freshness window for the cache probe, overriding the default.
    pub fn cache_timeout(mut self, timeout: Duration) -> Self {
        self.cache_timeout = Some(timeout);
        self
    }

    /// Mark this path's semantics as redirect-based ("random" endpoints).
    pub fn follow_redirect(mut self) -> Self {
        self.follow_redirect = true;
        self
    }

    /// Per-call timeout in seconds; zero or negative disables the timeout.
    pub fn timeout(mut self, seconds: f64) -> Self {
        self.timeout = Some(seconds);
        self
    }
}

/// What a dispatch produced before decoding.
enum Fetched {
    Body(Arc<String>),
    Redirect(String),
}

struct Inner {
    config: Config,
    registry: Registry,
    http: reqwest::Client,
    authorizer: tokio::sync::Mutex<Authorizer>,
    handler: Arc<dyn Handler>,
    modhash: std::sync::Mutex<Option<String>>,
}

/// A reddit session. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct RedditClient {
    inner: Arc<Inner>,
}

impl fmt::Debug for RedditClient {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RedditClient")
            .field("user_agent", &self.inner.config.user_agent)
            .finish()
    }
}

impl RedditClient {
    /// Create a session over the process-global handler.
    pub fn new(config: Config) -> Result<Self, RedditError> {
        Self::with_handler(config, handler::global_handler())
    }

    /// Create a session for a praw.ini site, with explicit overrides applied
    /// on top.
    pub fn from_site(site_name: &str, overrides: &[(&str, &str)]) -> Result<Self, RedditError> {
        let mut config = Config::load(site_name);
        for (key, value) in overrides {
            config.apply(key, value);
        }
        Self::new(config)
    }

    /// Create a session with an explicit handler, e.g. one shared with other
    /// processes.
    pub fn with_handler(config: Config, handler: Arc<dyn Handler>) -> Result<Self, RedditError> {
        config.check()?;

        let mut builder = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::none());
        if let Some(proxy) = &config.http_proxy {
            builder = builder.proxy(Proxy::http(proxy)?);
        }
        if let Some(proxy) = &config.https_proxy {
            builder = builder.proxy(Proxy::https(proxy)?);
        }
        let http = builder.build()?;

        if config.check_for_updates {
            debug!("Update checking is enabled for this session");
        }

        let registry = Registry::new(&config);
        let authorizer = Authorizer::new(config.clone());
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                registry,
                http,
                authorizer: tokio::sync::Mutex::new(authorizer),
                handler,
                modhash: std::sync::Mutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// The modhash captured from the most recent authenticated response.
    pub fn modhash(&self) -> Option<String> {
        self.inner.modhash.lock().unwrap().clone()
    }

    // ---- authorization surface ----

    /// Bind a token manager. Binding a second one fails.
    pub async fn set_token_manager(
        &self,
        manager: Box<dyn TokenManager>,
    ) -> Result<(), RedditError> {
        self.inner.authorizer.lock().await.set_token_manager(manager)
    }

    /// Force or lift read-only mode for this session.
    pub async fn set_read_only(&self, read_only: bool) -> Result<(), RedditError> {
        self.inner.authorizer.lock().await.force_read_only(read_only)
    }

    pub async fn is_read_only(&self) -> bool {
        self.inner.authorizer.lock().await.is_read_only()
    }

    /// The URL a user visits to authorize this client.
    pub async fn authorize_url(
        &self,
        duration: &str,
        scopes: &[&str],
        state: &str,
    ) -> Result<String, RedditError> {
        self.inner
            .authorizer
            .lock()
            .await
            .authorize_url(duration, scopes, state)
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<(), RedditError> {
        let mut authorizer = self.inner.authorizer.lock().await;
        authorizer.exchange_code(&self.inner.http, code).await
    }

    /// Run the full interactive installed-app flow: open the authorize URL
    /// in a browser, capture the code on a localhost callback, exchange it.
    pub async fn interactive_authorize(
        &self,
        port: u16,
        duration: &str,
        scopes: &[&str],
    ) -> Result<(), RedditError> {
        let state = interactive::state_token();
        let url = self.authorize_url(duration, scopes, &state).await?;
        let code = tokio::task::spawn_blocking(move || {
            interactive::obtain_code(&url, port, &state)
        })
        .await
        .map_err(|e| RedditError::Client(format!("callback task failed: {}", e)))??;
        self.exchange_code(&code).await
    }

    // ---- request surface ----

    /// GET a path and materialise the result.
    pub async fn get(&self, path: &str, params: &[(String, String)]) -> Result<Thing, RedditError> {
        self.fetch(Call::get(path).query(params)).await
    }

    /// GET a path and return the decoded body as a raw mapping.
    pub async fn get_value(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<Value, RedditError> {
        self.fetch_value(Call::get(path).query(params)).await
    }

    /// POST a form and materialise the result. `api_type=json` and the
    /// session modhash are added to the body.
    pub async fn post(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<Thing, RedditError> {
        let value = self.post_value(path, form).await?;
        Ok(self.inner.registry.objectify(Some(self), value))
    }

    /// POST a form and return the decoded body as a raw mapping.
    pub async fn post_value(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<Value, RedditError> {
        let mut form = form.to_vec();
        if !form.iter().any(|(key, _)| key == "api_type") {
            form.push(("api_type".to_string(), "json".to_string()));
        }
        if let Some(modhash) = self.modhash() {
            form.push(("uh".to_string(), modhash));
        }
        self.fetch_value(Call::post(path).form(&form)).await
    }

    /// Run a call through the pipeline and materialise the result.
    pub async fn fetch(&self, call: Call) -> Result<Thing, RedditError> {
        let value = self.fetch_value(call).await?;
        Ok(self.inner.registry.objectify(Some(self), value))
    }

    /// Run a call through the pipeline and return the decoded body.
    pub async fn fetch_value(&self, call: Call) -> Result<Value, RedditError> {
        match self.execute(&call).await? {
            Fetched::Body(text) => self.decode_body(&text),
            Fetched::Redirect(location) => Err(RedditError::Redirect {
                request_url: call.path.clone(),
                location,
            }),
        }
    }

    /// A lazy paginator over a listing endpoint.
    pub fn listing(&self, path: &str, params: &[(String, String)]) -> ListingGenerator {
        ListingGenerator::new(self.clone(), path, params)
    }

    /// An endless poll over a listing endpoint, for watching new activity.
    pub fn stream(&self, path: &str, params: &[(String, String)]) -> ListingStream {
        ListingStream::new(self.clone(), path, params)
    }

    /// A random subreddit, resolved through the server's 302 target.
    pub async fn random_subreddit(&self) -> Result<Subreddit, RedditError> {
        let call = Call::get("/r/random").follow_redirect();
        match self.execute(&call).await? {
            Fetched::Redirect(target) => {
                let name = subreddit_from_url(&target).ok_or_else(|| {
                    RedditError::Redirect {
                        request_url: "/r/random".to_string(),
                        location: target.clone(),
                    }
                })?;
                Ok(Subreddit::from_name(self, &name))
            }
            Fetched::Body(_) => Err(RedditError::Client(
                "expected a redirect from /r/random".to_string(),
            )),
        }
    }

    /// Drop cached responses for the given absolute URLs.
    pub fn evict(&self, urls: &[String]) {
        self.inner.handler.evict(urls);
    }

    /// Drop cached responses for a path, on both API hosts.
    pub fn evict_path(&self, path: &str) {
        let bare = path.split('?').next().unwrap_or(path);
        let config = &self.inner.config;
        self.inner.handler.evict(&[
            format!("{}{}", config.oauth_url, bare),
            format!("{}{}.json", config.reddit_url, bare),
            format!("{}{}", config.reddit_url, bare),
        ]);
    }

    pub fn clear_cache(&self) {
        self.inner.handler.clear_cache();
    }

    // ---- the pipeline ----

    async fn execute(&self, call: &Call) -> Result<Fetched, RedditError> {
        let config = &self.inner.config;

        // Resolve the bearer first; it decides the endpoint host.
        let mut bearer = {
            let mut authorizer = self.inner.authorizer.lock().await;
            authorizer.ensure_token(&self.inner.http).await?
        };
        let oauth = bearer.is_some();
        let mut bearer_id = bearer
            .clone()
            .unwrap_or_else(|| UNAUTHENTICATED.to_string());

        // Resolve the endpoint and fold path-embedded query parameters into
        // the canonical parameter list.
        let mut url = resolve_url(config, &call.path, oauth)?;
        let mut query: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        url.set_query(None);
        query.extend(call.query.iter().cloned());
        if !config.decode_html_entities && !query.iter().any(|(key, _)| key == "raw_json") {
            query.push(("raw_json".to_string(), "1".to_string()));
        }

        let mut key = RequestKey::new(call.method.as_str(), url.as_str(), &query, &call.form, &bearer_id);
        let safe = key.is_safe_method();

        // Cache probe. The lock is released before any network traffic, so
        // two first-time callers may both fetch; that beats holding a lock
        // across I/O.
        if safe && !call.cache_ignore {
            let window = call.cache_timeout.unwrap_or(DEFAULT_CACHE_TIMEOUT);
            if let Some(hit) = self.inner.handler.cache_lookup(&key, window) {
                debug!("Cache hit for {}", url);
                return Ok(match hit {
                    CachedResponse::Body(body) => Fetched::Body(body),
                    CachedResponse::Redirect(target) => Fetched::Redirect(target),
                });
            }
        }

        // Scope gate: fail before any traffic when the bearer cannot cover
        // the call.
        if !call.required_scopes.is_empty() {
            let authorizer = self.inner.authorizer.lock().await;
            let required: Vec<&str> =
                call.required_scopes.iter().map(String::as_str).collect();
            if !authorizer.scopes_cover(&required) {
                return Err(RedditError::ScopeRequired {
                    required: call.required_scopes.join(" "),
                    url: Some(url.to_string()),
                });
            }
        }

        let delay = if config.api_request_delay > 0.0 {
            Duration::from_secs_f64(config.api_request_delay)
        } else {
            Duration::ZERO
        };
        let timeout = match call.timeout {
            Some(seconds) if seconds > 0.0 => Some(Duration::from_secs_f64(seconds)),
            Some(_) => None,
            None => config.timeout_duration(),
        };

        let mut attempts = 0;
        let mut refreshed = false;
        loop {
            attempts += 1;
            self.inner.handler.throttle(&bearer_id, delay).await;

            let mut request = self
                .inner
                .http
                .request(call.method.clone(), url.clone())
                .query(&query);
            if let Some(token) = &bearer {
                request = request.header(AUTHORIZATION, format!("bearer {}", token));
            }
            if !call.form.is_empty() {
                request = request.form(&call.form);
            }
            if let Some(timeout) = timeout {
                request = request.timeout(timeout);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(err) => {
                    if config.retry_on_error && attempts < MAX_ATTEMPTS && !err.is_builder() {
                        warn!("Request to {} failed ({}), retrying", url, err);
                        continue;
                    }
                    return Err(err.into());
                }
            };

            let status = response.status().as_u16();
            match status {
                200..=299 => {
                    let text = match response.text().await {
                        Ok(text) => text,
                        Err(err) => {
                            // An incomplete read counts as transient.
                            if config.retry_on_error && attempts < MAX_ATTEMPTS {
                                warn!("Incomplete read from {} ({}), retrying", url, err);
                                continue;
                            }
                            return Err(err.into());
                        }
                    };
                    let text = Arc::new(text);
                    if safe && status == 200 {
                        self.inner
                            .handler
                            .cache_store(key, CachedResponse::Body(Arc::clone(&text)));
                    }
                    return Ok(Fetched::Body(text));
                }
                302 => {
                    let location = response
                        .headers()
                        .get(LOCATION)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("");
                    let target = url
                        .join(location)
                        .map(String::from)
                        .unwrap_or_else(|_| location.to_string());

                    // The server 302s searches for subreddits that do not
                    // exist.
                    if target.contains("/subreddits/search") || target.contains("/reddits/search")
                    {
                        return Err(RedditError::InvalidSubreddit {
                            url: url.to_string(),
                        });
                    }
                    if call.follow_redirect {
                        if safe {
                            self.inner
                                .handler
                                .cache_store(key, CachedResponse::Redirect(target.clone()));
                        }
                        return Ok(Fetched::Redirect(target));
                    }
                    return Err(RedditError::Redirect {
                        request_url: url.to_string(),
                        location: target,
                    });
                }
                401 => {
                    let challenge = response
                        .headers()
                        .get(WWW_AUTHENTICATE)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    if challenge.contains("insufficient_scope") {
                        return Err(RedditError::InsufficientScope {
                            url: url.to_string(),
                        });
                    }
                    if challenge.contains("invalid_token") {
                        if refreshed {
                            return Err(RedditError::InvalidToken {
                                url: url.to_string(),
                            });
                        }
                        refreshed = true;
                        debug!("Bearer rejected; attempting one transparent refresh");
                        {
                            let mut authorizer = self.inner.authorizer.lock().await;
                            authorizer.invalidate();
                            authorizer.refresh(&self.inner.http).await?;
                            bearer = authorizer.access_token().map(str::to_string);
                        }
                        bearer_id = bearer
                            .clone()
                            .unwrap_or_else(|| UNAUTHENTICATED.to_string());
                        key = RequestKey::new(
                            call.method.as_str(),
                            url.as_str(),
                            &query,
                            &call.form,
                            &bearer_id,
                        );
                        continue;
                    }
                    return Err(RedditError::OAuth {
                        message: format!("HTTP 401 ({})", challenge),
                        url: url.to_string(),
                    });
                }
                502 | 503 | 504 => {
                    if config.retry_on_error && attempts < MAX_ATTEMPTS {
                        warn!("HTTP {} from {}, retrying", status, url);
                        continue;
                    }
                    let body = response.text().await.unwrap_or_default();
                    return Err(RedditError::Http {
                        status,
                        url: url.to_string(),
                        body,
                    });
                }
                _ => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(RedditError::Http {
                        status,
                        url: url.to_string(),
                        body,
                    });
                }
            }
        }
    }

    /// Steps 10-12: parse, capture the modhash, translate API-level errors.
    fn decode_body(&self, text: &str) -> Result<Value, RedditError> {
        let value: Value = serde_json::from_str(text)?;

        if let Some(modhash) = find_modhash(&value) {
            *self.inner.modhash.lock().unwrap() = Some(modhash.to_string());
        }

        if let Some(errors) = value["json"]["errors"].as_array() {
            if !errors.is_empty() {
                let errors = errors.iter().map(api_error_from_entry).collect();
                return Err(RedditError::from_api_errors(errors));
            }
        }
        if value.get("error").and_then(Value::as_u64) == Some(304) {
            return Err(RedditError::NotModified);
        }

        Ok(value)
    }
}

/// Join a path onto the right host. Unauthenticated calls go to the public
/// host and take a `.json` suffix; bearer-carrying calls go to the OAuth
/// host, which always answers in JSON.
fn resolve_url(config: &Config, path: &str, oauth: bool) -> Result<url::Url, RedditError> {
    let full = if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else {
        let base = if oauth {
            &config.oauth_url
        } else {
            &config.reddit_url
        };
        let (bare, query) = match path.split_once('?') {
            Some((bare, query)) => (bare, Some(query)),
            None => (path, None),
        };
        let bare = if oauth || bare.ends_with(".json") {
            bare.to_string()
        } else {
            format!("{}.json", bare)
        };
        match query {
            Some(query) => format!("{}{}?{}", base, bare, query),
            None => format!("{}{}", base, bare),
        }
    };
    url::Url::parse(&full)
        .map_err(|e| RedditError::Client(format!("invalid request URL '{}': {}", full, e)))
}

/// The subreddit name inside a `/r/{name}/...` URL.
fn subreddit_from_url(target: &str) -> Option<String> {
    let parsed = url::Url::parse(target).ok()?;
    let mut segments = parsed.path_segments()?;
    match (segments.next(), segments.next()) {
        (Some("r"), Some(name)) if !name.is_empty() => {
            Some(name.trim_end_matches(".json").to_string())
        }
        _ => None,
    }
}

/// Listings carry the modhash at `data.modhash` of authenticated responses.
fn find_modhash(value: &Value) -> Option<&str> {
    value
        .get("data")
        .and_then(|data| data.get("modhash"))
        .or_else(|| value.get("modhash"))
        .and_then(Value::as_str)
        .filter(|modhash| !modhash.is_empty())
}

fn api_error_from_entry(entry: &Value) -> ApiError {
    let part = |index: usize| {
        entry
            .get(index)
            .and_then(Value::as_str)
            .unwrap_or_default()
    };
    ApiError::new(part(0), part(1), part(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_client() -> RedditClient {
        let mut config = Config::default();
        config.client_id = Some("cid".to_string());
        config.user_agent = "pipeline tests".to_string();
        RedditClient::new(config).unwrap()
    }

    #[test]
    fn resolve_url_switches_hosts_and_suffixes() {
        let config = Config::default();
        assert_eq!(
            resolve_url(&config, "/r/python/new", false).unwrap().as_str(),
            "https://www.reddit.com/r/python/new.json"
        );
        assert_eq!(
            resolve_url(&config, "/r/python/new", true).unwrap().as_str(),
            "https://oauth.reddit.com/r/python/new"
        );
        // Trailing slashes survive the suffix.
        assert_eq!(
            resolve_url(&config, "/r/python/", false).unwrap().as_str(),
            "https://www.reddit.com/r/python/.json"
        );
        // Query strings stay behind the suffix.
        assert_eq!(
            resolve_url(&config, "/api/info?id=t1_abc", false)
                .unwrap()
                .as_str(),
            "https://www.reddit.com/api/info.json?id=t1_abc"
        );
        // Absolute URLs pass through.
        assert_eq!(
            resolve_url(&config, "https://oauth.reddit.com/api/v1/me", true)
                .unwrap()
                .as_str(),
            "https://oauth.reddit.com/api/v1/me"
        );
    }

    #[test]
    fn subreddit_names_parse_out_of_redirect_targets() {
        assert_eq!(
            subreddit_from_url("https://oauth.reddit.com/r/learnrust/?utm=x").as_deref(),
            Some("learnrust")
        );
        assert_eq!(
            subreddit_from_url("https://www.reddit.com/r/rust.json").as_deref(),
            Some("rust")
        );
        assert_eq!(subreddit_from_url("https://www.reddit.com/user/spez"), None);
    }

    #[test]
    fn decode_body_captures_the_modhash() {
        let client = test_client();
        assert_eq!(client.modhash(), None);

        let body = json!({
            "kind": "Listing",
            "data": {"modhash": "mh-42", "children": [], "after": null, "before": null}
        })
        .to_string();
        client.decode_body(&body).unwrap();
        assert_eq!(client.modhash().as_deref(), Some("mh-42"));
    }

    #[test]
    fn decode_body_translates_api_errors() {
        let client = test_client();
        let body = json!({
            "json": {"errors": [["ALREADY_SUBMITTED", "that link has already been submitted", ""]]}
        })
        .to_string();
        match client.decode_body(&body) {
            Err(RedditError::Api(err)) => {
                assert_eq!(err.error_type, "ALREADY_SUBMITTED");
            }
            other => panic!("expected Api error, got {:?}", other),
        }

        let body = json!({
            "json": {"errors": [
                ["BAD_CAPTCHA", "care to try these again?", "captcha"],
                ["NO_TEXT", "we need something here", "title"],
            ]}
        })
        .to_string();
        match client.decode_body(&body) {
            Err(RedditError::ApiList(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected ApiList, got {:?}", other),
        }
    }

    #[test]
    fn decode_body_surfaces_not_modified() {
        let client = test_client();
        let body = json!({"error": 304}).to_string();
        assert!(matches!(
            client.decode_body(&body),
            Err(RedditError::NotModified)
        ));
    }

    #[test]
    fn construction_rejects_bad_config() {
        let config = Config::default();
        assert!(matches!(
            RedditClient::new(config),
            Err(RedditError::Client(_))
        ));
    }

    #[tokio::test]
    async fn read_only_toggle_is_guarded() {
        let client = test_client();
        assert!(client.is_read_only().await);
        assert!(client.set_read_only(true).await.is_ok());
        assert!(client.set_read_only(false).await.is_err());
    }
}
