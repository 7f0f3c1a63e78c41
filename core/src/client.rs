//! Stateless request builder and response parser for the remote todo table.
//!
//! # Design
//! `TodoClient` holds only the store coordinates (`base_url`, anon key,
//! table) and carries no mutable state between calls. Each table operation is
//! split into a `build_*` method that produces an `HttpRequest` and a
//! `parse_*` method that consumes an `HttpResponse`. The caller executes the
//! round-trip, keeping this layer deterministic and free of I/O.
//!
//! Every mutating request is filtered by both `id` and `user_id`, so a
//! request for a row owned by someone else matches zero rows even if the
//! store's own row-level policy were missing.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::de::DeserializeOwned;

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::{NewTodo, Todo, TodoPatch};

/// Characters left unescaped inside a filter value.
const FILTER_VALUE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

/// Synchronous, stateless client for the todo table.
#[derive(Debug, Clone)]
pub struct TodoClient {
    base_url: String,
    anon_key: String,
    table: String,
}

impl TodoClient {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            table: config.table.clone(),
        }
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    /// Base headers for every request. Without a user token the anon key
    /// doubles as the bearer, which the store treats as an anonymous caller.
    fn auth_headers(&self, bearer: Option<&str>) -> Vec<(String, String)> {
        let bearer = bearer.unwrap_or(&self.anon_key);
        vec![
            ("apikey".to_string(), self.anon_key.clone()),
            ("authorization".to_string(), format!("Bearer {bearer}")),
        ]
    }

    pub fn build_select_owned(&self, owner: &str, bearer: Option<&str>) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url: format!(
                "{}?select=*&user_id=eq.{}&order=created_at.desc",
                self.table_url(),
                encode(owner)
            ),
            headers: self.auth_headers(bearer),
            body: None,
        }
    }

    pub fn build_insert(&self, input: &NewTodo, bearer: Option<&str>) -> Result<HttpRequest, StoreError> {
        let body = serde_json::to_string(input).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let mut headers = self.auth_headers(bearer);
        headers.push(("content-type".to_string(), "application/json".to_string()));
        headers.push(("prefer".to_string(), "return=minimal".to_string()));
        Ok(HttpRequest {
            method: HttpMethod::Post,
            url: self.table_url(),
            headers,
            body: Some(body),
        })
    }

    pub fn build_update(
        &self,
        id: &str,
        owner: &str,
        patch: &TodoPatch,
        bearer: Option<&str>,
    ) -> Result<HttpRequest, StoreError> {
        let body = serde_json::to_string(patch).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let mut headers = self.auth_headers(bearer);
        headers.push(("content-type".to_string(), "application/json".to_string()));
        headers.push(("prefer".to_string(), "return=representation".to_string()));
        Ok(HttpRequest {
            method: HttpMethod::Patch,
            url: self.row_url(id, owner),
            headers,
            body: Some(body),
        })
    }

    pub fn build_delete(&self, id: &str, owner: &str, bearer: Option<&str>) -> HttpRequest {
        let mut headers = self.auth_headers(bearer);
        headers.push(("prefer".to_string(), "return=representation".to_string()));
        HttpRequest {
            method: HttpMethod::Delete,
            url: self.row_url(id, owner),
            headers,
            body: None,
        }
    }

    fn row_url(&self, id: &str, owner: &str) -> String {
        format!(
            "{}?id=eq.{}&user_id=eq.{}",
            self.table_url(),
            encode(id),
            encode(owner)
        )
    }

    pub fn parse_select(&self, response: HttpResponse) -> Result<Vec<Todo>, StoreError> {
        check_status(&response, 200)?;
        parse_json(&response.body)
    }

    pub fn parse_insert(&self, response: HttpResponse) -> Result<(), StoreError> {
        check_status(&response, 201)
    }

    /// Returns the rows the update touched; empty when nothing matched.
    pub fn parse_update(&self, response: HttpResponse) -> Result<Vec<Todo>, StoreError> {
        check_status(&response, 200)?;
        parse_json(&response.body)
    }

    /// Returns the rows the delete removed; empty when nothing matched.
    pub fn parse_delete(&self, response: HttpResponse) -> Result<Vec<Todo>, StoreError> {
        check_status(&response, 200)?;
        parse_json(&response.body)
    }
}

fn encode(value: &str) -> String {
    utf8_percent_encode(value, FILTER_VALUE).to_string()
}

fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T, StoreError> {
    serde_json::from_str(body).map_err(|e| StoreError::Deserialization(e.to_string()))
}

/// Map non-success status codes to the appropriate `StoreError` variant.
fn check_status(response: &HttpResponse, expected: u16) -> Result<(), StoreError> {
    if response.status == expected {
        return Ok(());
    }
    let message = error_message(&response.body);
    match response.status {
        401 | 403 => Err(StoreError::Unauthorized {
            status: response.status,
            message,
        }),
        status => Err(StoreError::Http { status, message }),
    }
}

/// The store reports errors as `{"message": ...}`; fall back to the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> TodoClient {
        TodoClient::new(&StoreConfig::new("http://localhost:3000", "anon"))
    }

    #[test]
    fn select_filters_by_owner_newest_first() {
        let req = client().build_select_owned("user_1", Some("tok"));
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(
            req.url,
            "http://localhost:3000/rest/v1/todos?select=*&user_id=eq.user_1&order=created_at.desc"
        );
        assert_eq!(req.header("apikey"), Some("anon"));
        assert_eq!(req.header("Authorization"), Some("Bearer tok"));
        assert!(req.body.is_none());
    }

    #[test]
    fn missing_token_falls_back_to_anon_bearer() {
        let req = client().build_select_owned("user_1", None);
        assert_eq!(req.header("authorization"), Some("Bearer anon"));
    }

    #[test]
    fn insert_sends_owner_and_incomplete_flag() {
        let input = NewTodo {
            text: "buy milk".to_string(),
            completed: false,
            user_id: "user_1".to_string(),
        };
        let req = client().build_insert(&input, Some("tok")).unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, "http://localhost:3000/rest/v1/todos");
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.header("prefer"), Some("return=minimal"));
        let body: serde_json::Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["text"], "buy milk");
        assert_eq!(body["completed"], false);
        assert_eq!(body["user_id"], "user_1");
    }

    #[test]
    fn update_is_scoped_to_id_and_owner() {
        let req = client()
            .build_update("42", "user_1", &TodoPatch::completed(true), Some("tok"))
            .unwrap();
        assert_eq!(req.method, HttpMethod::Patch);
        assert_eq!(
            req.url,
            "http://localhost:3000/rest/v1/todos?id=eq.42&user_id=eq.user_1"
        );
        assert_eq!(req.header("prefer"), Some("return=representation"));
        assert_eq!(req.body.as_deref(), Some(r#"{"completed":true}"#));
    }

    #[test]
    fn delete_is_scoped_to_id_and_owner() {
        let req = client().build_delete("42", "user_1", None);
        assert_eq!(req.method, HttpMethod::Delete);
        assert_eq!(
            req.url,
            "http://localhost:3000/rest/v1/todos?id=eq.42&user_id=eq.user_1"
        );
        assert!(req.body.is_none());
    }

    #[test]
    fn filter_values_are_percent_encoded() {
        let req = client().build_delete("a&b=c", "user 1", None);
        assert_eq!(
            req.url,
            "http://localhost:3000/rest/v1/todos?id=eq.a%26b%3Dc&user_id=eq.user%201"
        );
    }

    #[test]
    fn trailing_slash_is_stripped_and_table_is_configurable() {
        let config = StoreConfig::new("http://localhost:3000/", "anon").with_table("todos3");
        let req = TodoClient::new(&config).build_select_owned("u", None);
        assert!(req.url.starts_with("http://localhost:3000/rest/v1/todos3?"));
    }

    #[test]
    fn parse_select_success() {
        let response = HttpResponse::new(
            200,
            r#"[{"id":"1","text":"Test","completed":false,"created_at":"2024-01-01T00:00:00Z","user_id":"u"}]"#,
        );
        let todos = client().parse_select(response).unwrap();
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].text, "Test");
    }

    #[test]
    fn parse_select_bad_json() {
        let err = client().parse_select(HttpResponse::new(200, "not json")).unwrap_err();
        assert!(matches!(err, StoreError::Deserialization(_)));
    }

    #[test]
    fn parse_insert_requires_created() {
        assert!(client().parse_insert(HttpResponse::new(201, "")).is_ok());
        let err = client()
            .parse_insert(HttpResponse::new(500, r#"{"message":"boom"}"#))
            .unwrap_err();
        assert!(matches!(err, StoreError::Http { status: 500, ref message } if message == "boom"));
    }

    #[test]
    fn forbidden_maps_to_unauthorized() {
        let err = client()
            .parse_update(HttpResponse::new(
                403,
                r#"{"message":"new row violates row-level security policy"}"#,
            ))
            .unwrap_err();
        assert!(matches!(err, StoreError::Unauthorized { status: 403, .. }));
    }

    #[test]
    fn non_json_error_body_is_kept_verbatim() {
        let err = client().parse_delete(HttpResponse::new(502, "bad gateway")).unwrap_err();
        assert_eq!(err.to_string(), "HTTP 502: bad gateway");
    }

    #[test]
    fn parse_delete_returns_removed_rows() {
        let rows = client().parse_delete(HttpResponse::new(200, "[]")).unwrap();
        assert!(rows.is_empty());
    }
}
