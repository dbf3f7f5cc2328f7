// sigscictl - CLI for the Signal Sciences dashboard API
// Copyright (C) 2025 sigscictl contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use anyhow::{Context, Result};
use reqwest::blocking::{Client, Response};
use reqwest::header::ACCEPT;
use reqwest::{StatusCode, Url};
use serde_json::Value;

use crate::error::Error;
use crate::pagination::{FeedPage, PageSource};
use crate::timerange::TimeRange;

pub const DEFAULT_BASE_URL: &str = "https://dashboard.signalsciences.net";

const API_PREFIX: &str = "/api/v0";
const USER_AGENT_STR: &str = concat!("sigscictl/", env!("CARGO_PKG_VERSION"));

const REQUESTS_EP: &str = "/requests";
const FEED_EP: &str = "/feed/requests";
const TIMESERIES_EP: &str = "/timeseries/requests";
const EVENTS_EP: &str = "/events";
const AGENTS_EP: &str = "/agents";
const MEMBERS_EP: &str = "/members";

/// Endpoint for site custom tags; its `add` payloads need an extra
/// server-assigned field removed.
pub const CUSTOM_TAGS_EP: &str = "/tags";

/// Blocking client for the dashboard API.
///
/// Authentication is a bearer-token plus session-cookie exchange: `login`
/// POSTs credentials, keeps the returned token for the `Authorization`
/// header, and the cookie store carries the session cookie alongside it.
#[derive(Debug)]
pub struct ApiClient {
    base_url: String,
    api_url: String,
    http: Client,
    email: String,
    password: String,
    corp: String,
    site: String,
    token: Option<String>,
}

/// Issue a call, retrying exactly once on a transport-level failure. The
/// retry budget never accumulates across calls.
fn with_retry<T>(mut call: impl FnMut() -> reqwest::Result<T>) -> Result<T, Error> {
    match call() {
        Ok(value) => Ok(value),
        Err(_) => call().map_err(Error::RequestFailed),
    }
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        email: &str,
        password: &str,
        corp: &str,
        site: &str,
    ) -> Result<Self> {
        Url::parse(base_url).context("parsing base URL")?;
        let http = Client::builder()
            .cookie_store(true)
            .user_agent(USER_AGENT_STR)
            .build()
            .context("building HTTP client")?;

        let base_url = base_url.trim_end_matches('/').to_string();
        let api_url = format!("{base_url}{API_PREFIX}");

        Ok(Self {
            base_url,
            api_url,
            http,
            email: email.to_string(),
            password: password.to_string(),
            corp: corp.to_string(),
            site: site.to_string(),
            token: None,
        })
    }

    /// Exchange credentials for a bearer token and session cookie.
    pub fn login(&mut self) -> Result<(), Error> {
        let url = format!("{}/auth", self.api_url);
        let response = with_retry(|| {
            self.http
                .post(&url)
                .form(&[
                    ("email", self.email.as_str()),
                    ("password", self.password.as_str()),
                ])
                .send()
        })?;

        let status = response.status();
        let text = response.text().map_err(Error::RequestFailed)?;
        let json: Value = serde_json::from_str(&text).unwrap_or(Value::Null);

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let message = json
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("invalid credentials");
            return Err(Error::AuthenticationFailed(message.to_string()));
        }
        if !status.is_success() {
            return Err(Error::AuthenticationFailed(format!(
                "unexpected status {status}: {text}"
            )));
        }

        match json.get("token").and_then(Value::as_str) {
            Some(token) => {
                self.token = Some(token.to_string());
                Ok(())
            }
            None => Err(Error::AuthenticationFailed(
                "auth response carried no token".to_string(),
            )),
        }
    }

    fn site_url(&self, endpoint: &str) -> String {
        format!(
            "{}/corps/{}/sites/{}{}",
            self.api_url, self.corp, self.site, endpoint
        )
    }

    /// GET a URL and parse the envelope. `shown` is the query text to report
    /// in errors; it carries the search parameters the URL alone does not.
    fn get_value(&self, url: &str, params: &[(&str, String)], shown: &str) -> Result<Value, Error> {
        let response = with_retry(|| {
            let mut request = self.http.get(url).header(ACCEPT, "application/json");
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }
            if !params.is_empty() {
                request = request.query(params);
            }
            request.send()
        })?;
        self.parse_response(response, shown)
    }

    fn parse_response(&self, response: Response, shown: &str) -> Result<Value, Error> {
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(Error::AuthenticationFailed("session expired".to_string()));
        }

        let text = response.text().map_err(Error::RequestFailed)?;
        let json: Value = serde_json::from_str(&text)?;

        // An error payload carries a top-level `message` regardless of status.
        if let Some(message) = json.get("message").and_then(Value::as_str) {
            return Err(Error::Upstream {
                message: message.to_string(),
                query: shown.to_string(),
            });
        }

        Ok(json)
    }

    /// Plain GET of a site-scoped endpoint (agents, config objects, ...).
    pub fn get_site_endpoint(&self, endpoint: &str) -> Result<Value, Error> {
        let url = self.site_url(endpoint);
        self.get_value(&url, &[], &url)
    }

    pub fn corps(&self) -> Result<Value, Error> {
        let url = format!("{}/corps", self.api_url);
        self.get_value(&url, &[], &url)
    }

    pub fn sites(&self) -> Result<Value, Error> {
        let url = format!("{}/corps/{}/sites", self.api_url, self.corp);
        self.get_value(&url, &[], &url)
    }

    pub fn members(&self) -> Result<Value, Error> {
        self.get_site_endpoint(MEMBERS_EP)
    }

    pub fn users(&self) -> Result<Value, Error> {
        let url = format!("{}/corps/{}/users", self.api_url, self.corp);
        self.get_value(&url, &[], &url)
    }

    pub fn agents(&self) -> Result<Value, Error> {
        self.get_site_endpoint(AGENTS_EP)
    }

    pub fn agent_logs(&self, agent: &str) -> Result<Value, Error> {
        self.get_site_endpoint(&format!("{AGENTS_EP}/{agent}/logs"))
    }

    /// One search call without pagination, for `--field` queries that want
    /// the raw envelope rather than the record stream.
    pub fn search_once(&self, query: &str, limit: usize) -> Result<Value, Error> {
        let url = self.site_url(REQUESTS_EP);
        let shown = format!("{url}?q={query}&limit={limit}");
        self.get_value(
            &url,
            &[("q", query.to_string()), ("limit", limit.to_string())],
            &shown,
        )
    }

    pub fn timeseries(
        &self,
        range: &TimeRange,
        tags: &[String],
        rollup: u32,
    ) -> Result<Value, Error> {
        let url = self.site_url(TIMESERIES_EP);
        let mut params = vec![
            ("rollup", rollup.to_string()),
            ("from", range.from_epoch.to_string()),
            ("until", range.until_epoch.to_string()),
        ];
        for tag in tags {
            params.push(("tag", tag.clone()));
        }
        self.get_value(&url, &params, &url)
    }

    pub fn events(
        &self,
        range: &TimeRange,
        tag: Option<&str>,
        limit: usize,
    ) -> Result<Value, Error> {
        let url = self.site_url(EVENTS_EP);
        let mut params = vec![
            ("limit", limit.to_string()),
            ("from", range.from_epoch.to_string()),
            ("until", range.until_epoch.to_string()),
        ];
        if let Some(tag) = tag {
            params.push(("tag", tag.trim().to_string()));
        }
        self.get_value(&url, &params, &url)
    }

    pub fn event_by_id(&self, id: &str) -> Result<Value, Error> {
        self.get_site_endpoint(&format!("{EVENTS_EP}/{id}"))
    }

    fn post_value(&self, url: &str, payload: &Value) -> Result<Value, Error> {
        let response = with_retry(|| {
            let mut request = self
                .http
                .post(url)
                .header(ACCEPT, "application/json")
                .json(payload);
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }
            request.send()
        })?;
        self.parse_response(response, url)
    }

    /// Push configuration objects to a site endpoint.
    ///
    /// A payload with a `data` array (the shape `config <resource> get`
    /// writes) is replayed entry by entry with the server-assigned
    /// `created`/`createdBy`/`id` fields removed; anything else is posted
    /// as-is.
    pub fn post_config(&self, endpoint: &str, payload: &Value) -> Result<(), Error> {
        let url = self.site_url(endpoint);

        let entries = match payload.get("data").and_then(Value::as_array) {
            None => {
                self.post_value(&url, payload)?;
                return Ok(());
            }
            Some(entries) => entries,
        };

        for entry in entries {
            let mut entry = entry.clone();
            if let Some(map) = entry.as_object_mut() {
                map.remove("created");
                map.remove("createdBy");
                map.remove("id");
                if endpoint == CUSTOM_TAGS_EP {
                    map.remove("tagName");
                }
            }
            self.post_value(&url, &entry)?;
        }
        Ok(())
    }

    /// Delete every configuration object named by id in the payload's
    /// `data` array.
    pub fn delete_config(&self, endpoint: &str, payload: &Value) -> Result<(), Error> {
        let entries = payload
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for entry in &entries {
            let id = match entry.get("id").and_then(Value::as_str) {
                Some(id) => id,
                None => continue,
            };
            let url = format!("{}/{}", self.site_url(endpoint), id);
            let response = with_retry(|| {
                let mut request = self.http.delete(&url).header(ACCEPT, "application/json");
                if let Some(token) = &self.token {
                    request = request.bearer_auth(token);
                }
                request.send()
            })?;
            if response.status() == StatusCode::UNAUTHORIZED {
                return Err(Error::AuthenticationFailed("session expired".to_string()));
            }
        }
        Ok(())
    }
}

fn feed_page_from(mut value: Value) -> FeedPage {
    let next_uri = value
        .pointer("/next/uri")
        .and_then(Value::as_str)
        .map(str::to_string);
    let data = match value.get_mut("data").map(Value::take) {
        Some(Value::Array(records)) => records,
        _ => Vec::new(),
    };
    FeedPage { data, next_uri }
}

impl PageSource for ApiClient {
    fn search_page(&mut self, query: &str, limit: usize) -> Result<Vec<Value>, Error> {
        let mut envelope = self.search_once(query, limit)?;
        match envelope.get_mut("data").map(Value::take) {
            Some(Value::Array(records)) => Ok(records),
            _ => Ok(Vec::new()),
        }
    }

    fn feed_start(&mut self, range: &TimeRange, tags: &[String]) -> Result<FeedPage, Error> {
        let url = self.site_url(FEED_EP);
        let mut params = vec![
            ("from", range.from_epoch.to_string()),
            ("until", range.until_epoch.to_string()),
        ];
        if !tags.is_empty() {
            params.push(("tags", tags.join(",")));
        }
        let value = self.get_value(&url, &params, &url)?;
        Ok(feed_page_from(value))
    }

    fn feed_follow(&mut self, uri: &str) -> Result<FeedPage, Error> {
        // The continuation link embeds its own state; it resolves against
        // the dashboard root, not the API prefix, and gets no extra
        // parameters.
        let url = format!("{}{}", self.base_url, uri);
        let value = self.get_value(&url, &[], &url)?;
        Ok(feed_page_from(value))
    }

    fn reauthenticate(&mut self) -> Result<(), Error> {
        self.token = None;
        self.login()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> ApiClient {
        ApiClient::new(
            &server.base_url(),
            "foo@bar.test",
            "hunter2",
            "corp1",
            "site1",
        )
        .unwrap()
    }

    #[test]
    fn login_stores_token_and_sends_it_as_bearer() {
        let server = MockServer::start();
        let auth = server.mock(|when, then| {
            when.method(POST).path("/api/v0/auth");
            then.status(200).json_body(json!({"token": "tok-123"}));
        });
        let agents = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v0/corps/corp1/sites/site1/agents")
                .header("authorization", "Bearer tok-123");
            then.status(200).json_body(json!({"data": []}));
        });

        let mut client = client(&server);
        client.login().unwrap();
        client.agents().unwrap();

        auth.assert();
        agents.assert();
    }

    #[test]
    fn bad_credentials_surface_the_server_message() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/v0/auth");
            then.status(401).json_body(json!({"message": "Invalid login"}));
        });

        let err = client(&server).login().unwrap_err();
        match err {
            Error::AuthenticationFailed(message) => assert_eq!(message, "Invalid login"),
            other => panic!("expected AuthenticationFailed, got {other:?}"),
        }
    }

    #[test]
    fn search_page_sends_query_and_limit() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v0/corps/corp1/sites/site1/requests")
                .query_param("q", "from:1 until:2 sort:time-asc")
                .query_param("limit", "1000");
            then.status(200)
                .json_body(json!({"data": [{"id": "a"}, {"id": "b"}]}));
        });

        let mut client = client(&server);
        let records = client
            .search_page("from:1 until:2 sort:time-asc", 1000)
            .unwrap();

        mock.assert();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn error_payloads_become_upstream_errors_with_the_query() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET)
                .path("/api/v0/corps/corp1/sites/site1/requests");
            then.status(200)
                .json_body(json!({"message": "query window too large"}));
        });

        let mut client = client(&server);
        let err = client
            .search_page("from:1 until:2 sort:time-asc", 1000)
            .unwrap_err();
        match err {
            Error::Upstream { message, query } => {
                assert_eq!(message, "query window too large");
                assert!(query.contains("/requests?q=from:1"));
            }
            other => panic!("expected Upstream, got {other:?}"),
        }
    }

    #[test]
    fn unauthorized_responses_map_to_authentication_failed() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/feed/continue");
            then.status(401).body("");
        });

        let mut client = client(&server);
        let err = client.feed_follow("/feed/continue").unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailed(_)));
    }

    #[test]
    fn feed_follow_hits_the_dashboard_root_verbatim() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/feed/continue").query_param("p", "2");
            then.status(200).json_body(json!({
                "data": [{"id": "x"}],
                "next": {"uri": ""}
            }));
        });

        let mut client = client(&server);
        let page = client.feed_follow("/feed/continue?p=2").unwrap();

        mock.assert();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.next_uri.as_deref(), Some(""));
    }

    #[test]
    fn feed_start_joins_tags_with_commas() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v0/corps/corp1/sites/site1/feed/requests")
                .query_param("from", "100")
                .query_param("until", "200")
                .query_param("tags", "SQLI,XSS");
            then.status(200).json_body(json!({
                "data": [],
                "next": {"uri": "/feed/next"}
            }));
        });

        let mut client = client(&server);
        let range = TimeRange {
            from_epoch: 100,
            until_epoch: 200,
        };
        let page = client
            .feed_start(&range, &["SQLI".to_string(), "XSS".to_string()])
            .unwrap();

        mock.assert();
        assert_eq!(page.next_uri.as_deref(), Some("/feed/next"));
    }

    #[test]
    fn post_config_strips_server_assigned_fields() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/v0/corps/corp1/sites/site1/alerts")
                .json_body(json!({"tagName": "CMDEXE", "interval": 5}));
            then.status(200).json_body(json!({"ok": true}));
        });

        let client = client(&server);
        let payload = json!({"data": [{
            "id": "abc",
            "created": "2024-01-01T00:00:00Z",
            "createdBy": "someone",
            "tagName": "CMDEXE",
            "interval": 5
        }]});
        client.post_config("/alerts", &payload).unwrap();

        mock.assert();
    }

    #[test]
    fn delete_config_removes_each_entry_by_id() {
        let server = MockServer::start();
        let first = server.mock(|when, then| {
            when.method(DELETE)
                .path("/api/v0/corps/corp1/sites/site1/redactions/r1");
            then.status(200).body("");
        });
        let second = server.mock(|when, then| {
            when.method(DELETE)
                .path("/api/v0/corps/corp1/sites/site1/redactions/r2");
            then.status(200).body("");
        });

        let client = client(&server);
        let payload = json!({"data": [{"id": "r1"}, {"id": "r2"}, {"noId": true}]});
        client.delete_config("/redactions", &payload).unwrap();

        first.assert();
        second.assert();
    }
}
