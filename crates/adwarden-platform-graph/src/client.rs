//! HTTP client for the Graph API

use adwarden_api::{EntityLevel, ObservedEntity, RunState};
use adwarden_config::PlatformConfig;
use adwarden_platform_api::{EntityFilter, PlatformClient, PlatformError, PlatformResult};
use adwarden_util::EntityId;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use url::Url;

use crate::wire::{status_for, ErrorEnvelope, ListResponse, RawEntity, UpdateResponse};

/// Upper bound on followed `paging.next` links per fetch
const MAX_PAGES: usize = 20;

/// Entities requested per page
const PAGE_SIZE: u32 = 500;

/// Spend is limited to today's insights in the account time zone
const ENTITY_FIELDS: &str = "id,name,status,daily_budget,insights.date_preset(today){spend}";

/// Graph API platform client
pub struct GraphPlatform {
    client: Client,
    /// `{base_url}/{api_version}`
    root: Url,
    account_id: String,
    level: EntityLevel,
    access_token: String,
    budget_in_minor_units: bool,
}

impl GraphPlatform {
    pub fn new(config: &PlatformConfig, access_token: impl Into<String>) -> PlatformResult<Self> {
        let root = Url::parse(&format!(
            "{}/{}/",
            config.base_url.trim_end_matches('/'),
            config.api_version
        ))
        .map_err(|e| PlatformError::Transport(format!("Invalid base URL: {}", e)))?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.request_timeout)
            .build()
            .map_err(|e| PlatformError::Transport(e.to_string()))?;

        info!(
            root = %root,
            account = %config.account_id,
            level = %config.level,
            "Graph platform client created"
        );

        Ok(Self {
            client,
            root,
            account_id: config.account_id.clone(),
            level: config.level,
            access_token: access_token.into(),
            budget_in_minor_units: config.budget_in_minor_units,
        })
    }

    fn endpoint(&self, path: &str) -> PlatformResult<Url> {
        self.root
            .join(path)
            .map_err(|e| PlatformError::Transport(format!("Invalid endpoint {}: {}", path, e)))
    }

    fn list_query(&self, filter: &EntityFilter) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("fields", ENTITY_FIELDS.to_string()),
            ("limit", PAGE_SIZE.to_string()),
            ("access_token", self.access_token.clone()),
        ];

        if let Some(ids) = &filter.ids {
            let filtering = serde_json::json!([{
                "field": "id",
                "operator": "IN",
                "value": ids.iter().map(|id| id.as_str()).collect::<Vec<_>>(),
            }]);
            query.push(("filtering", filtering.to_string()));
        }

        query
    }
}

fn map_reqwest_error(e: reqwest::Error) -> PlatformError {
    if e.is_timeout() {
        PlatformError::Timeout
    } else if e.is_decode() {
        PlatformError::Malformed(e.to_string())
    } else {
        PlatformError::Transport(e.to_string())
    }
}

/// Turn a response into a typed body, mapping platform error envelopes
async fn read_body<T: DeserializeOwned>(response: Response) -> PlatformResult<T> {
    let status = response.status();
    let body = response.bytes().await.map_err(map_reqwest_error)?;

    if status.is_server_error() {
        return Err(PlatformError::Server {
            status: status.as_u16(),
        });
    }

    if let Ok(envelope) = serde_json::from_slice::<ErrorEnvelope>(&body) {
        return Err(PlatformError::Api {
            code: envelope.error.code,
            message: envelope.error.message,
        });
    }

    if !status.is_success() {
        return Err(PlatformError::Api {
            code: None,
            message: format!("HTTP {}", status.as_u16()),
        });
    }

    serde_json::from_slice(&body).map_err(|e| PlatformError::Malformed(e.to_string()))
}

#[async_trait]
impl PlatformClient for GraphPlatform {
    async fn fetch_entities(&self, filter: &EntityFilter) -> PlatformResult<Vec<ObservedEntity>> {
        let url = self.endpoint(&format!("{}/{}", self.account_id, self.level.edge()))?;

        let response = self
            .client
            .get(url)
            .query(&self.list_query(filter))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let mut page: ListResponse = read_body(response).await?;

        let mut entities = Vec::new();
        let mut dropped = 0usize;
        let mut malformed = 0usize;
        let mut pages = 1;

        loop {
            for row in page.data {
                let raw = match serde_json::from_value::<RawEntity>(row) {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!(error = %e, "Skipping malformed entity row");
                        malformed += 1;
                        continue;
                    }
                };
                let id = raw.id.clone();
                let status = raw.status.clone();
                match raw.into_observed(self.budget_in_minor_units) {
                    Some(entity) if filter.matches(&entity.id) => entities.push(entity),
                    Some(_) => {}
                    None => {
                        debug!(entity_id = %id, status = %status, "Skipping uncontrollable entity");
                        dropped += 1;
                    }
                }
            }

            let Some(next) = page.paging.and_then(|p| p.next) else {
                break;
            };
            if pages >= MAX_PAGES {
                warn!(pages, "Page limit reached, remaining entities ignored");
                break;
            }

            // `next` already carries the query string, token included
            let response = self
                .client
                .get(&next)
                .send()
                .await
                .map_err(map_reqwest_error)?;
            page = read_body(response).await?;
            pages += 1;
        }

        debug!(count = entities.len(), dropped, malformed, pages, "Entities fetched");
        Ok(entities)
    }

    async fn set_run_state(&self, id: &EntityId, state: RunState) -> PlatformResult<()> {
        let url = self.endpoint(id.as_str())?;

        let response = self
            .client
            .post(url)
            .query(&[("access_token", self.access_token.as_str())])
            .form(&[("status", status_for(state))])
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let body: UpdateResponse = read_body(response).await?;

        if !body.success {
            return Err(PlatformError::Api {
                code: None,
                message: format!("Update of {} was not acknowledged", id),
            });
        }

        debug!(entity_id = %id, state = %state, "Run-state command accepted");
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        let url = match self.endpoint(&self.account_id) {
            Ok(url) => url,
            Err(_) => return false,
        };

        match self
            .client
            .get(url)
            .query(&[("fields", "id"), ("access_token", self.access_token.as_str())])
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Platform health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str) -> PlatformConfig {
        PlatformConfig {
            base_url: base_url.to_string(),
            api_version: "v19.0".into(),
            account_id: "act_42".into(),
            level: EntityLevel::Adset,
            access_token_env: "ADWARDEN_ACCESS_TOKEN".into(),
            request_timeout: Duration::from_secs(2),
            budget_in_minor_units: true,
        }
    }

    fn client(server: &MockServer) -> GraphPlatform {
        GraphPlatform::new(&config(&server.uri()), "secret-token").unwrap()
    }

    #[tokio::test]
    async fn fetch_maps_entities() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v19.0/act_42/adsets"))
            .and(query_param("access_token", "secret-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {
                        "id": "111",
                        "name": "Morning leads",
                        "status": "PAUSED",
                        "daily_budget": "10000",
                        "insights": { "data": [ { "spend": "40.00" } ] }
                    },
                    { "id": "222", "name": "Old", "status": "ARCHIVED", "daily_budget": "5000" },
                    { "id": "333", "name": "No spend yet", "status": "ACTIVE", "daily_budget": "2000" }
                ]
            })))
            .mount(&server)
            .await;

        let entities = client(&server)
            .fetch_entities(&EntityFilter::all())
            .await
            .unwrap();

        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].id.as_str(), "111");
        assert_eq!(entities[0].run_state, RunState::Paused);
        assert_eq!(entities[0].daily_budget, Some(100.0));
        assert_eq!(entities[0].spend, Some(40.0));
        assert_eq!(entities[1].id.as_str(), "333");
        assert_eq!(entities[1].spend, None);
    }

    #[tokio::test]
    async fn malformed_row_does_not_lose_the_page() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v19.0/act_42/adsets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    { "id": "111", "status": "PAUSED", "daily_budget": "10000" },
                    { "id": "222", "daily_budget": "10000" },
                    { "id": 333, "status": "ACTIVE" },
                    { "id": "444", "status": "ACTIVE", "name": ["not", "a", "name"] },
                    { "id": "555", "status": "ACTIVE" }
                ]
            })))
            .mount(&server)
            .await;

        let entities = client(&server)
            .fetch_entities(&EntityFilter::all())
            .await
            .unwrap();
        let ids: Vec<_> = entities.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["111", "555"]);
    }

    #[tokio::test]
    async fn fetch_follows_paging() {
        let server = MockServer::start().await;
        let next = format!("{}/v19.0/act_42/adsets/page2?access_token=secret-token", server.uri());

        Mock::given(method("GET"))
            .and(path("/v19.0/act_42/adsets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [ { "id": "1", "status": "ACTIVE" } ],
                "paging": { "next": next }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v19.0/act_42/adsets/page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [ { "id": "2", "status": "PAUSED" } ]
            })))
            .mount(&server)
            .await;

        let entities = client(&server)
            .fetch_entities(&EntityFilter::all())
            .await
            .unwrap();
        let ids: Vec<_> = entities.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn fetch_sends_id_filter() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v19.0/act_42/adsets"))
            .and(query_param(
                "filtering",
                r#"[{"field":"id","operator":"IN","value":["111"]}]"#,
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [ { "id": "111", "status": "ACTIVE" } ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let filter = EntityFilter::from_allow_list(&[EntityId::new("111")]);
        let entities = client(&server).fetch_entities(&filter).await.unwrap();
        assert_eq!(entities.len(), 1);
    }

    #[tokio::test]
    async fn api_error_envelope_is_reported() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v19.0/act_42/adsets"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": { "message": "Invalid OAuth access token.", "code": 190 }
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .fetch_entities(&EntityFilter::all())
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::Api { code: Some(190), .. }));
    }

    #[tokio::test]
    async fn server_error_and_malformed_body() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v19.0/act_42/adsets"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v19.0/act_42/ads"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&server)
            .await;

        let err = client(&server)
            .fetch_entities(&EntityFilter::all())
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::Server { status: 502 }));

        let mut ad_config = config(&server.uri());
        ad_config.level = EntityLevel::Ad;
        let ads = GraphPlatform::new(&ad_config, "secret-token").unwrap();
        let err = ads.fetch_entities(&EntityFilter::all()).await.unwrap_err();
        assert!(matches!(err, PlatformError::Malformed(_)));
    }

    #[tokio::test]
    async fn slow_platform_times_out() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v19.0/act_42/adsets"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "data": [] }))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let mut slow = config(&server.uri());
        slow.request_timeout = Duration::from_millis(200);
        let platform = GraphPlatform::new(&slow, "secret-token").unwrap();

        let err = platform
            .fetch_entities(&EntityFilter::all())
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::Timeout));
    }

    #[tokio::test]
    async fn set_run_state_posts_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v19.0/111"))
            .and(body_string_contains("status=ACTIVE"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "success": true })),
            )
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .set_run_state(&EntityId::new("111"), RunState::Running)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn set_run_state_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v19.0/111"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": { "message": "Ad set is archived", "code": 100 }
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .set_run_state(&EntityId::new("111"), RunState::Paused)
            .await
            .unwrap_err();
        match err {
            PlatformError::Api { message, .. } => assert_eq!(message, "Ad set is archived"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn health_check() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v19.0/act_42"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "act_42" })),
            )
            .mount(&server)
            .await;

        assert!(client(&server).is_healthy().await);
    }
}
