//! Localhost callback capture for the installed-app authorization flow.
//!
//! Starts a throwaway HTTP listener, opens the authorize URL in the user's
//! browser, and waits for reddit to redirect back with the authorization
//! code. The echoed `state` must match the one baked into the URL.

use std::collections::HashMap;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use log::{debug, info};
use rand::{distributions::Alphanumeric, Rng};
use tiny_http::{Response, Server, StatusCode};
use url::Url;

use crate::errors::RedditError;

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Generate a random state token to prevent CSRF.
pub fn state_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

/// Open `authorize_url` in a browser and block until the localhost callback
/// on `port` delivers an authorization code, or five minutes pass.
pub fn obtain_code(
    authorize_url: &str,
    port: u16,
    expected_state: &str,
) -> Result<String, RedditError> {
    let server = Server::http(format!("127.0.0.1:{}", port)).map_err(|e| {
        RedditError::Client(format!("Failed to start local server: {}", e))
    })?;

    let (tx, rx) = mpsc::channel();
    let state = expected_state.to_string();
    let tx_server = tx.clone();

    let server_thread = thread::spawn(move || {
        info!(
            "Waiting for authorization callback on http://localhost:{}/callback",
            port
        );
        for request in server.incoming_requests() {
            let path = request.url();
            if !path.starts_with("/callback") {
                let response =
                    Response::from_string("<html><body><h1>404 Not Found</h1></body></html>")
                        .with_status_code(StatusCode(404));
                request.respond(response).ok();
                continue;
            }
            debug!("Received callback: {}", path);

            let url_str = format!("http://localhost{}", path);
            let query: HashMap<String, String> = match Url::parse(&url_str) {
                Ok(url) => url
                    .query_pairs()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                Err(_) => {
                    let response = Response::from_string(
                        "<html><body><h1>Error</h1><p>Invalid callback URL</p></body></html>",
                    )
                    .with_status_code(StatusCode(400));
                    request.respond(response).ok();
                    continue;
                }
            };

            if let Some(error) = query.get("error") {
                tx_server
                    .send(Err(format!("Authorization error: {}", error)))
                    .ok();
                let response = Response::from_string(format!(
                    "<html><body><h1>Authentication Error</h1><p>{}</p></body></html>",
                    error
                ))
                .with_status_code(StatusCode(400));
                request.respond(response).ok();
                break;
            }

            match query.get("state") {
                Some(received) if received == &state => {
                    if let Some(code) = query.get("code") {
                        tx_server.send(Ok(code.to_string())).ok();
                        let response = Response::from_string(
                            "<html><body><h1>Authentication Successful</h1>\
                             <p>You can now close this window and return to the \
                             application.</p></body></html>",
                        )
                        .with_status_code(StatusCode(200));
                        request.respond(response).ok();
                    } else {
                        tx_server
                            .send(Err("No authorization code received".to_string()))
                            .ok();
                        let response = Response::from_string(
                            "<html><body><h1>Authentication Error</h1>\
                             <p>No authorization code received</p></body></html>",
                        )
                        .with_status_code(StatusCode(400));
                        request.respond(response).ok();
                    }
                }
                Some(_) => {
                    tx_server
                        .send(Err("State mismatch - possible CSRF attack".to_string()))
                        .ok();
                    let response = Response::from_string(
                        "<html><body><h1>Authentication Error</h1>\
                         <p>State mismatch - possible CSRF attack</p></body></html>",
                    )
                    .with_status_code(StatusCode(400));
                    request.respond(response).ok();
                }
                None => {
                    tx_server
                        .send(Err("No state parameter received".to_string()))
                        .ok();
                    let response = Response::from_string(
                        "<html><body><h1>Authentication Error</h1>\
                         <p>No state parameter received</p></body></html>",
                    )
                    .with_status_code(StatusCode(400));
                    request.respond(response).ok();
                }
            }
            break;
        }
    });

    info!("Opening browser for Reddit OAuth authorization...");
    if let Err(e) = webbrowser::open(authorize_url) {
        tx.send(Err(format!("Failed to open browser: {}", e))).ok();
    }
    info!("If your browser doesn't open automatically, please visit this URL:");
    info!("{}", authorize_url);

    let result = rx
        .recv_timeout(CALLBACK_TIMEOUT)
        .map_err(|_| RedditError::Client("Timed out waiting for authorization".to_string()))?;
    let _ = server_thread.join();

    result.map_err(RedditError::Client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_tokens_are_long_and_distinct() {
        let a = state_token();
        let b = state_token();
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
