//! Shared fixtures for the integration tests: a client wired to a wiremock
//! server with an isolated handler, and JSON builders for reddit envelopes.

use std::sync::Arc;

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use redgraph::client::handler::DefaultHandler;
use redgraph::{Config, RedditClient};

/// A config pointing both API hosts at the mock server, with pacing off so
/// tests run fast. Individual tests override the delay where pacing is the
/// point.
pub fn test_config(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.client_id = Some("test-client".to_string());
    config.client_secret = Some("test-secret".to_string());
    config.user_agent = "redgraph integration tests".to_string();
    config.apply("reddit_url", &server.uri());
    config.apply("oauth_url", &server.uri());
    config.apply("api_request_delay", "0");
    config
}

/// A client over a fresh handler so tests cannot see each other's cache or
/// pacing state.
pub fn client_for(server: &MockServer) -> RedditClient {
    client_with_config(test_config(server))
}

pub fn client_with_config(config: Config) -> RedditClient {
    let _ = env_logger::builder().is_test(true).try_init();
    RedditClient::with_handler(config, Arc::new(DefaultHandler::new())).unwrap()
}

/// Serve bearer `token` for every token-endpoint call.
pub async fn mount_token_endpoint(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(token, "*")))
        .mount(server)
        .await;
}

pub fn token_body(token: &str, scope: &str) -> Value {
    json!({
        "access_token": token,
        "token_type": "bearer",
        "expires_in": 3600,
        "scope": scope,
    })
}

/// A listing envelope of submission stubs `start..start+count`, with an
/// optional `after` cursor.
pub fn submission_listing(start: usize, count: usize, after: Option<&str>) -> Value {
    let children: Vec<Value> = (start..start + count)
        .map(|i| {
            json!({
                "kind": "t3",
                "data": {
                    "id": format!("post{}", i),
                    "name": format!("t3_post{}", i),
                    "title": format!("Post number {}", i),
                    "subreddit": "python",
                }
            })
        })
        .collect();
    json!({
        "kind": "Listing",
        "data": {
            "children": children,
            "after": after,
            "before": null,
        }
    })
}

pub fn comment_json(id: &str, parent: &str, replies: Value) -> Value {
    json!({
        "kind": "t1",
        "data": {
            "id": id,
            "name": format!("t1_{}", id),
            "parent_id": parent,
            "link_id": "t3_post",
            "body": format!("comment {}", id),
            "replies": replies,
        }
    })
}
