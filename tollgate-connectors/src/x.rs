//! The X (Twitter) HTTP connector.
//!
//! Four static tools over the v2 API: `post_tweet` signs with the OAuth
//! 1.0a user context (writes require it), the read tools use the app
//! bearer token. Upstream failures are normalized into error-flagged
//! [`CallToolResult`]s so callers never re-parse provider errors.

use std::collections::BTreeMap;

use serde_json::{Value, json};
use tollgate_mcp::types::{CallToolResult, ContentPart, Tool};

use crate::oauth1::OAuth1Signer;

const DEFAULT_BASE_URL: &str = "https://api.x.com/2";

/// Credentials and HTTP plumbing for the X connector.
#[derive(Debug, Clone)]
pub struct XConnector {
    client: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
    oauth: Option<OAuth1Signer>,
}

impl XConnector {
    /// Creates the connector. Either credential may be absent; tools that
    /// need the missing one fail with an error result.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        bearer_token: Option<String>,
        oauth: Option<OAuth1Signer>,
    ) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_owned(),
            bearer_token,
            oauth,
        }
    }

    /// Overrides the base URL (tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    /// The connector's static tool descriptors.
    #[must_use]
    pub fn tools() -> Vec<Tool> {
        vec![
            Tool {
                name: "post_tweet".into(),
                description: "Post a tweet from the configured account".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "text": { "type": "string", "description": "Tweet text, up to 280 characters" }
                    },
                    "required": ["text"]
                }),
            },
            Tool {
                name: "get_user_timeline".into(),
                description: "Fetch recent tweets of a user by id".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "user_id": { "type": "string" },
                        "max_results": { "type": "integer", "minimum": 5, "maximum": 100 }
                    },
                    "required": ["user_id"]
                }),
            },
            Tool {
                name: "search_tweets".into(),
                description: "Search recent tweets".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string" },
                        "max_results": { "type": "integer", "minimum": 10, "maximum": 100 }
                    },
                    "required": ["query"]
                }),
            },
            Tool {
                name: "get_user_info".into(),
                description: "Look up a user by username".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "username": { "type": "string" }
                    },
                    "required": ["username"]
                }),
            },
        ]
    }

    /// Dispatches one tool call.
    pub async fn call(&self, tool_name: &str, args: &Value) -> CallToolResult {
        match tool_name {
            "post_tweet" => self.post_tweet(args).await,
            "get_user_timeline" => self.get_user_timeline(args).await,
            "search_tweets" => self.search_tweets(args).await,
            "get_user_info" => self.get_user_info(args).await,
            other => CallToolResult::error(format!("unknown tool '{other}'")),
        }
    }

    async fn post_tweet(&self, args: &Value) -> CallToolResult {
        let Some(text) = args.get("text").and_then(Value::as_str) else {
            return CallToolResult::error("'text' is required");
        };
        let Some(oauth) = &self.oauth else {
            return CallToolResult::error("OAuth 1.0a user credentials are not configured");
        };

        let url = format!("{}/tweets", self.base_url);
        // The v2 endpoint takes a JSON body; body fields do not participate
        // in the OAuth 1.0a signature.
        let authorization = oauth.authorization_header("POST", &url, &BTreeMap::new());
        let response = self
            .client
            .post(&url)
            .header("authorization", authorization)
            .json(&json!({ "text": text }))
            .send()
            .await;
        normalize_response(response).await
    }

    async fn get_user_timeline(&self, args: &Value) -> CallToolResult {
        let Some(user_id) = args.get("user_id").and_then(Value::as_str) else {
            return CallToolResult::error("'user_id' is required");
        };
        let max_results = args
            .get("max_results")
            .and_then(Value::as_u64)
            .unwrap_or(10);
        let url = format!("{}/users/{user_id}/tweets", self.base_url);
        self.bearer_get(&url, &[("max_results", max_results.to_string())])
            .await
    }

    async fn search_tweets(&self, args: &Value) -> CallToolResult {
        let Some(query) = args.get("query").and_then(Value::as_str) else {
            return CallToolResult::error("'query' is required");
        };
        let max_results = args
            .get("max_results")
            .and_then(Value::as_u64)
            .unwrap_or(10);
        let url = format!("{}/tweets/search/recent", self.base_url);
        self.bearer_get(
            &url,
            &[
                ("query", query.to_owned()),
                ("max_results", max_results.to_string()),
            ],
        )
        .await
    }

    async fn get_user_info(&self, args: &Value) -> CallToolResult {
        let Some(username) = args.get("username").and_then(Value::as_str) else {
            return CallToolResult::error("'username' is required");
        };
        let url = format!("{}/users/by/username/{username}", self.base_url);
        self.bearer_get(
            &url,
            &[(
                "user.fields",
                "description,public_metrics,created_at".to_owned(),
            )],
        )
        .await
    }

    async fn bearer_get(&self, url: &str, query: &[(&str, String)]) -> CallToolResult {
        let Some(bearer) = &self.bearer_token else {
            return CallToolResult::error("bearer token is not configured");
        };
        let response = self
            .client
            .get(url)
            .bearer_auth(bearer)
            .query(query)
            .send()
            .await;
        normalize_response(response).await
    }
}

/// Normalizes an upstream response into a [`CallToolResult`]: 2xx bodies
/// become a text part plus the raw JSON; anything else becomes an error
/// result carrying the upstream message.
async fn normalize_response(response: Result<reqwest::Response, reqwest::Error>) -> CallToolResult {
    let response = match response {
        Ok(r) => r,
        Err(e) => return CallToolResult::error(format!("request failed: {e}")),
    };
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);

    if status.is_success() {
        CallToolResult {
            content: vec![ContentPart::text(body.to_string())],
            raw: body,
            is_error: false,
        }
    } else {
        let detail = body
            .get("detail")
            .or_else(|| body.get("title"))
            .and_then(Value::as_str)
            .map_or_else(|| format!("status {status}"), str::to_owned);
        CallToolResult {
            content: vec![ContentPart::text(format!("Error: {detail}"))],
            raw: json!({ "error": body, "status": status.as_u16() }),
            is_error: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth1::OAuth1Credentials;
    use wiremock::matchers::{header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn oauth() -> OAuth1Signer {
        OAuth1Signer::new(OAuth1Credentials {
            consumer_key: "ck".into(),
            consumer_secret: "cs".into(),
            access_token: "at".into(),
            access_token_secret: "ats".into(),
        })
    }

    #[tokio::test]
    async fn post_tweet_sends_oauth_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tweets"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "data": { "id": "1", "text": "hello" }
            })))
            .mount(&server)
            .await;

        let connector = XConnector::new(reqwest::Client::new(), None, Some(oauth()))
            .with_base_url(server.uri());
        let result = connector
            .call("post_tweet", &json!({ "text": "hello" }))
            .await;
        assert!(!result.is_error);
        assert_eq!(result.raw["data"]["id"], "1");
    }

    #[tokio::test]
    async fn read_tools_use_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tweets/search/recent"))
            .and(query_param("query", "rust"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(&server)
            .await;

        let connector = XConnector::new(reqwest::Client::new(), Some("bt".into()), None)
            .with_base_url(server.uri());
        let result = connector
            .call("search_tweets", &json!({ "query": "rust" }))
            .await;
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn upstream_error_is_normalized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/by/username/ghost"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "title": "Not Found Error",
                "detail": "Could not find user with username: [ghost]."
            })))
            .mount(&server)
            .await;

        let connector = XConnector::new(reqwest::Client::new(), Some("bt".into()), None)
            .with_base_url(server.uri());
        let result = connector
            .call("get_user_info", &json!({ "username": "ghost" }))
            .await;
        assert!(result.is_error);
        let text = result.content[0].as_text().unwrap();
        assert!(text.starts_with("Error:"));
        assert!(text.contains("ghost"));
    }

    #[tokio::test]
    async fn missing_required_argument_fails_locally() {
        let connector = XConnector::new(reqwest::Client::new(), Some("bt".into()), None);
        let result = connector.call("post_tweet", &json!({})).await;
        assert!(result.is_error);
    }
}
