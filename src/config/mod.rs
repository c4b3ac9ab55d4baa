//! Configuration module handling defaults, praw.ini sites, environment
//! variables, and construction-time overrides.
//!
//! Resolution priority, lowest to highest: built-in defaults, the named
//! `[site]` section of a `praw.ini` found in the platform config directory,
//! the user config directory, or the working directory, then `praw_`-prefixed
//! environment variables, then explicit overrides passed at construction.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;

use log::{info, warn};

use crate::errors::RedditError;

/// Fullname prefixes for the five primary entity kinds. Overridable through
/// the `comment_kind` .. `subreddit_kind` settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindMap {
    pub comment: String,
    pub message: String,
    pub redditor: String,
    pub submission: String,
    pub subreddit: String,
}

impl Default for KindMap {
    fn default() -> Self {
        Self {
            comment: "t1".to_string(),
            message: "t4".to_string(),
            redditor: "t2".to_string(),
            submission: "t3".to_string(),
            subreddit: "t5".to_string(),
        }
    }
}

impl KindMap {
    /// Resolve a kind tag back to its entity name, if it is one of the five.
    pub fn name_for(&self, kind: &str) -> Option<&'static str> {
        if kind == self.comment {
            Some("comment")
        } else if kind == self.message {
            Some("message")
        } else if kind == self.redditor {
            Some("redditor")
        } else if kind == self.submission {
            Some("submission")
        } else if kind == self.subreddit {
            Some("subreddit")
        } else {
            None
        }
    }
}

/// Resolved, immutable client settings. Created once at session construction
/// and never mutated by the core afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    // OAuth credentials
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub refresh_token: Option<String>,
    pub redirect_uri: Option<String>,

    // Identity and endpoints
    pub user_agent: String,
    pub oauth_url: String,
    pub reddit_url: String,
    short_url: Option<String>,

    // Transport
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,

    // Timing and behaviour
    pub api_request_delay: f64,
    pub timeout: f64,
    pub retry_on_error: bool,
    pub check_for_updates: bool,
    pub decode_html_entities: bool,
    pub store_json_result: bool,

    pub kinds: KindMap,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            username: None,
            password: None,
            refresh_token: None,
            redirect_uri: None,
            user_agent: String::new(),
            oauth_url: "https://oauth.reddit.com".to_string(),
            reddit_url: "https://www.reddit.com".to_string(),
            short_url: Some("https://redd.it".to_string()),
            http_proxy: None,
            https_proxy: None,
            api_request_delay: 1.0,
            timeout: 16.0,
            retry_on_error: true,
            check_for_updates: true,
            decode_html_entities: false,
            store_json_result: false,
            kinds: KindMap::default(),
        }
    }
}

impl Config {
    /// Load the configuration for a named praw.ini site, layering INI values
    /// and environment variables over the defaults.
    pub fn load(site_name: &str) -> Self {
        let mut config = Self::default();

        for path in Self::config_search_paths() {
            if let Ok(contents) = fs::read_to_string(&path) {
                info!("Loading settings from {}", path.display());
                for (key, value) in parse_ini_section(&contents, site_name) {
                    config.apply(&key, &value);
                }
            }
        }

        config.apply_env();
        config
    }

    /// Overlay `praw_`-prefixed environment variables.
    fn apply_env(&mut self) {
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix("praw_") {
                let stripped = stripped.to_string();
                self.apply(&stripped, &value);
            }
        }
    }

    /// Apply a single named setting. Unknown keys are ignored so praw.ini
    /// files written for richer clients still load.
    pub fn apply(&mut self, key: &str, value: &str) {
        match key {
            "client_id" => self.client_id = non_empty(value),
            "client_secret" => self.client_secret = non_empty(value),
            "username" => self.username = non_empty(value),
            "password" => self.password = non_empty(value),
            "refresh_token" => self.refresh_token = non_empty(value),
            "redirect_uri" => self.redirect_uri = non_empty(value),
            "user_agent" => self.user_agent = value.to_string(),
            "oauth_url" => self.oauth_url = value.trim_end_matches('/').to_string(),
            "reddit_url" => self.reddit_url = value.trim_end_matches('/').to_string(),
            "short_url" => {
                self.short_url = non_empty(value).map(|v| v.trim_end_matches('/').to_string())
            }
            "http_proxy" => self.http_proxy = non_empty(value),
            "https_proxy" => self.https_proxy = non_empty(value),
            "api_request_delay" => {
                if let Ok(delay) = value.parse::<f64>() {
                    self.api_request_delay = delay;
                }
            }
            "timeout" => {
                if let Ok(timeout) = value.parse::<f64>() {
                    self.timeout = timeout;
                }
            }
            "retry_on_error" => self.retry_on_error = parse_bool(value, self.retry_on_error),
            "check_for_updates" => {
                self.check_for_updates = parse_bool(value, self.check_for_updates)
            }
            "decode_html_entities" => {
                self.decode_html_entities = parse_bool(value, self.decode_html_entities)
            }
            "store_json_result" => {
                self.store_json_result = parse_bool(value, self.store_json_result)
            }
            "comment_kind" => self.kinds.comment = value.to_string(),
            "message_kind" => self.kinds.message = value.to_string(),
            "redditor_kind" => self.kinds.redditor = value.to_string(),
            "submission_kind" => self.kinds.submission = value.to_string(),
            "subreddit_kind" => self.kinds.subreddit = value.to_string(),
            _ => {}
        }
    }

    /// Candidate praw.ini locations, most general first so later files win.
    fn config_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(mut dir) = dirs::config_dir() {
            dir.push("praw.ini");
            paths.push(dir);
        }
        if let Some(mut dir) = dirs::home_dir() {
            dir.push(".config");
            dir.push("praw.ini");
            paths.push(dir);
        }
        paths.push(PathBuf::from("praw.ini"));
        paths
    }

    /// Validate the fields every session requires. Fails fast before any
    /// request can be issued.
    pub fn check(&self) -> Result<(), RedditError> {
        if self.user_agent.trim().is_empty() {
            return Err(RedditError::Client(
                "user_agent must be a non-empty string".to_string(),
            ));
        }
        if self.user_agent.to_lowercase().contains("bot") {
            warn!(
                "The user agent '{}' contains 'bot'; reddit may throttle clients \
                 that look like bots",
                self.user_agent
            );
        }
        if self.client_id.as_deref().map_or(true, str::is_empty) {
            return Err(RedditError::Client(
                "client_id must be provided".to_string(),
            ));
        }
        Ok(())
    }

    /// The short-link domain. Errors only when consumed while unset.
    pub fn short_url(&self) -> Result<&str, RedditError> {
        self.short_url
            .as_deref()
            .ok_or_else(|| RedditError::ConfigMissing("short_url".to_string()))
    }

    /// Per-request timeout; zero or negative disables it.
    pub fn timeout_duration(&self) -> Option<std::time::Duration> {
        if self.timeout > 0.0 {
            Some(std::time::Duration::from_secs_f64(self.timeout))
        } else {
            None
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_bool(value: &str, fallback: bool) -> bool {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => fallback,
    }
}

/// Pull the `key = value` pairs out of one `[section]` of an INI document.
fn parse_ini_section(contents: &str, section: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();
    let mut in_section = false;

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            in_section = line[1..line.len() - 1].trim() == section;
            continue;
        }
        if !in_section {
            continue;
        }
        if let Some(eq) = line.find('=') {
            let key = line[..eq].trim().to_string();
            let value = line[eq + 1..].trim().to_string();
            values.insert(key, value);
        }
    }

    values
}
