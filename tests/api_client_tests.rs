use std::time::Instant;

use chrono::NaiveDate;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gitlab_reporter::models::Connection;
use gitlab_reporter::GitLabApiClient;

fn connection_to(server: &MockServer) -> Connection {
    Connection {
        id: "c1".into(),
        name: "Work".into(),
        server_url: server.uri(),
        access_token: "secret-token".into(),
        ..Default::default()
    }
}

fn commit_json(id: &str, created_at: &str) -> serde_json::Value {
    json!({
        "id": id,
        "short_id": &id[..id.len().min(8)],
        "message": format!("feat: change {}", id),
        "author_name": "alice",
        "author_email": "alice@example.com",
        "created_at": created_at,
        "parent_ids": ["p"]
    })
}

#[tokio::test]
async fn test_project_pagination_concatenates_pages_in_order() {
    let server = MockServer::start().await;

    let next = format!(
        "<{}/api/v4/projects?page=2>; rel=\"next\"",
        server.uri()
    );
    Mock::given(method("GET"))
        .and(path("/api/v4/projects"))
        .and(query_param("page", "1"))
        .and(header("PRIVATE-TOKEN", "secret-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Link", next.as_str())
                .set_body_json(json!([
                    {"id": 1, "path_with_namespace": "team/alpha", "name": "alpha"},
                    {"id": 2, "path_with_namespace": "team/beta", "name": "beta"}
                ])),
        )
        .mount(&server)
        .await;

    let next = format!(
        "<{}/api/v4/projects?page=3>; rel=\"next\"",
        server.uri()
    );
    Mock::given(method("GET"))
        .and(path("/api/v4/projects"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Link", next.as_str())
                .set_body_json(json!([
                    {"id": 3, "path_with_namespace": "team/gamma", "name": "gamma"}
                ])),
        )
        .mount(&server)
        .await;

    // Last page: no Link header with rel="next"
    Mock::given(method("GET"))
        .and(path("/api/v4/projects"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 4, "path_with_namespace": "team/delta", "name": "delta"}
        ])))
        .mount(&server)
        .await;

    let client = GitLabApiClient::new().unwrap();
    let projects = client.fetch_projects(&connection_to(&server)).await.unwrap();

    let ids: Vec<&str> = projects.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3", "4"]);
    // Connection ownership is annotated on every page
    assert!(projects.iter().all(|p| p.connection_id == "c1"));
}

#[tokio::test]
async fn test_rate_limit_honors_retry_after() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v4/projects/42/repository/commits"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "2"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/42/repository/commits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            commit_json("aaaa1111bbbb2222", "2026-03-02T10:00:00Z")
        ])))
        .mount(&server)
        .await;

    let client = GitLabApiClient::new().unwrap();
    let since = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
    let until = NaiveDate::from_ymd_opt(2026, 3, 8).unwrap();

    let started = Instant::now();
    let commits = client
        .fetch_commits(&connection_to(&server), "42", since, until)
        .await
        .unwrap();

    assert!(started.elapsed().as_secs_f64() >= 2.0);
    assert_eq!(commits.len(), 1);
}

#[tokio::test]
async fn test_rate_limit_does_not_consume_retry_budget() {
    let server = MockServer::start().await;

    // Three throttled responses, one more than the transient-failure budget
    // would allow if 429 counted against it.
    Mock::given(method("GET"))
        .and(path("/api/v4/user"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v4/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 7, "username": "alice", "name": "Alice", "email": "alice@example.com"
        })))
        .mount(&server)
        .await;

    let client = GitLabApiClient::new().unwrap();
    let user = client
        .validate_token(&server.uri(), "secret-token")
        .await
        .unwrap();

    assert_eq!(user.unwrap().username, "alice");
}

#[tokio::test]
async fn test_transport_failures_exhaust_retry_budget() {
    // Nothing listens here: every attempt fails at the connection level.
    let client = GitLabApiClient::new().unwrap();
    let connection = Connection {
        id: "c1".into(),
        name: "Broken".into(),
        server_url: "http://127.0.0.1:1".into(),
        access_token: "secret-token".into(),
        ..Default::default()
    };

    let since = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
    let until = NaiveDate::from_ymd_opt(2026, 3, 8).unwrap();
    let result = client.fetch_commits(&connection, "42", since, until).await;

    assert!(matches!(
        result,
        Err(gitlab_reporter::ReporterError::Network { .. })
    ));
}

#[tokio::test]
async fn test_server_error_stops_pagination_with_accumulated_pages() {
    let server = MockServer::start().await;

    let next = format!(
        "<{}/api/v4/projects?page=2>; rel=\"next\"",
        server.uri()
    );
    Mock::given(method("GET"))
        .and(path("/api/v4/projects"))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Link", next.as_str())
                .set_body_json(json!([
                    {"id": 1, "path_with_namespace": "team/alpha", "name": "alpha"}
                ])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = GitLabApiClient::new().unwrap();
    let projects = client.fetch_projects(&connection_to(&server)).await.unwrap();
    assert_eq!(projects.len(), 1);
}

#[tokio::test]
async fn test_invalid_token_resolves_to_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/user"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = GitLabApiClient::new().unwrap();
    let user = client.validate_token(&server.uri(), "bad-token").await.unwrap();
    assert!(user.is_none());
}

#[tokio::test]
async fn test_commit_query_uses_full_day_range() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v4/projects/team%2Fapp/repository/commits"))
        .and(query_param("since", "2026-03-02T00:00:00Z"))
        .and(query_param("until", "2026-03-08T23:59:59Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let client = GitLabApiClient::new().unwrap();
    let since = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
    let until = NaiveDate::from_ymd_opt(2026, 3, 8).unwrap();
    let commits = client
        .fetch_commits(&connection_to(&server), "team/app", since, until)
        .await
        .unwrap();
    assert!(commits.is_empty());
}
