//! Pagination behaviour of the listing generator against a mock server.

use serde_json::json;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use redgraph::Thing;

mod support;
use support::*;

#[tokio::test]
async fn limit_fifty_pages_twice_and_stops() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, "token-1").await;

    Mock::given(method("GET"))
        .and(path("/r/python/top"))
        .and(query_param("limit", "25"))
        .and(query_param_is_missing("after"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(submission_listing(0, 25, Some("t3_post24"))),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/r/python/top"))
        .and(query_param("after", "t3_post24"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(submission_listing(25, 25, Some("t3_post49"))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let items = client
        .listing("/r/python/top", &[])
        .limit(Some(50))
        .collect()
        .await
        .unwrap();

    // Exactly 50 items, in server order, despite the live cursor.
    assert_eq!(items.len(), 50);
    assert_eq!(
        items[0].fullname().as_deref(),
        Some("t3_post0")
    );
    assert_eq!(
        items[49].fullname().as_deref(),
        Some("t3_post49")
    );
}

#[tokio::test]
async fn unbounded_iteration_ends_when_the_cursor_runs_out() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, "token-1").await;

    Mock::given(method("GET"))
        .and(path("/r/python/new"))
        .and(query_param("limit", "100"))
        .and(query_param_is_missing("after"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(submission_listing(0, 100, Some("t3_post99"))),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/r/python/new"))
        .and(query_param("after", "t3_post99"))
        .respond_with(ResponseTemplate::new(200).set_body_json(submission_listing(100, 30, None)))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let items = client
        .listing("/r/python/new", &[])
        .limit(None)
        .collect()
        .await
        .unwrap();
    assert_eq!(items.len(), 130);
}

#[tokio::test]
async fn server_default_limit_fetches_a_single_page() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, "token-1").await;

    // No limit parameter reaches the server, and the returned cursor is
    // never followed.
    Mock::given(method("GET"))
        .and(path("/r/python/hot"))
        .and(query_param_is_missing("limit"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(submission_listing(0, 7, Some("t3_post6"))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let items = client
        .listing("/r/python/hot", &[])
        .limit(Some(0))
        .collect()
        .await
        .unwrap();
    assert_eq!(items.len(), 7);
}

#[tokio::test]
async fn place_holder_terminates_iteration_early() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, "token-1").await;

    Mock::given(method("GET"))
        .and(path("/r/python/new"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(submission_listing(0, 10, Some("t3_post9"))),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let items = client
        .listing("/r/python/new", &[])
        .limit(None)
        .place_holder("t3_post5")
        .collect()
        .await
        .unwrap();

    // Items before the place-holder are yielded; the match itself is not.
    assert_eq!(items.len(), 5);
    assert_eq!(items.last().unwrap().fullname().as_deref(), Some("t3_post4"));
}

#[tokio::test]
async fn comments_page_paginates_the_selected_sub_listing() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, "token-1").await;

    let submission_part = json!({
        "kind": "Listing",
        "data": {"children": [
            {"kind": "t3", "data": {"id": "post", "name": "t3_post", "title": "The post"}}
        ], "after": null, "before": null}
    });
    let comments_part = json!({
        "kind": "Listing",
        "data": {"children": [
            comment_json("a", "t3_post", json!("")),
            comment_json("b", "t3_post", json!("")),
        ], "after": null, "before": null}
    });

    Mock::given(method("GET"))
        .and(path("/comments/post"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([submission_part, comments_part])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let items = client
        .listing("/comments/post", &[])
        .limit(Some(0))
        .object_filter(1)
        .collect()
        .await
        .unwrap();

    assert_eq!(items.len(), 2);
    assert!(matches!(items[0], Thing::Comment(_)));
}
