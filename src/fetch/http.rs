use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::config::{MonitorConfig, APP_NAME, APP_VERSION};
use crate::models::enums::ScopeKind;
use crate::models::{Scope, SubjectId};

use super::source::{parse_roster, unwrap_collection, MonitoringSource};
use super::types::{ResourceError, ScheduleUpdate};

/// Longest upstream error body echoed into a `ResourceError`.
const MAX_ERROR_BODY: usize = 200;

/// `MonitoringSource` over the upstream REST API.
#[derive(Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ResourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!("{APP_NAME}/{APP_VERSION}"))
            .build()
            .map_err(|e| ResourceError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &MonitorConfig) -> Result<Self, ResourceError> {
        Self::new(&config.upstream_url, config.upstream_timeout())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, ResourceError> {
        let url = self.url(path);
        tracing::debug!(url = %url, "Upstream GET");

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;

        response
            .json::<Value>()
            .await
            .map_err(|e| ResourceError::Decode(e.to_string()))
    }

    async fn get_collection(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<Value>, ResourceError> {
        unwrap_collection(self.get_json(path, query).await?)
    }
}

fn scope_query(scope: &Scope) -> Vec<(&'static str, String)> {
    vec![
        ("scope", scope.kind.as_str().to_string()),
        ("viewer", scope.viewer.to_string()),
    ]
}

fn transport_error(e: reqwest::Error) -> ResourceError {
    if e.is_decode() {
        ResourceError::Decode(e.to_string())
    } else {
        ResourceError::Transport(e.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ResourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message: String = body.chars().take(MAX_ERROR_BODY).collect();
    tracing::warn!(status = status.as_u16(), "Upstream request rejected");
    Err(ResourceError::Status {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl MonitoringSource for HttpSource {
    async fn resolve_scope(
        &self,
        kind: ScopeKind,
        viewer: &SubjectId,
    ) -> Result<Scope, ResourceError> {
        let query = vec![
            ("scope", kind.as_str().to_string()),
            ("viewer", viewer.to_string()),
        ];
        let payload = self.get_json("roster", &query).await?;
        parse_roster(kind, viewer, payload)
    }

    async fn fetch_history(&self, scope: &Scope, limit: u32) -> Result<Vec<Value>, ResourceError> {
        let mut query = scope_query(scope);
        query.push(("limit", limit.to_string()));
        self.get_collection("history", &query).await
    }

    async fn fetch_alerts(&self, scope: &Scope, limit: u32) -> Result<Vec<Value>, ResourceError> {
        let mut query = scope_query(scope);
        query.push(("limit", limit.to_string()));
        self.get_collection("alerts", &query).await
    }

    async fn fetch_readings(
        &self,
        scope: &Scope,
        since: DateTime<Utc>,
    ) -> Result<Vec<Value>, ResourceError> {
        let mut query = scope_query(scope);
        query.push(("since", since.to_rfc3339_opts(SecondsFormat::Secs, true)));
        self.get_collection("readings", &query).await
    }

    async fn fetch_refills(&self, scope: &Scope) -> Result<Vec<Value>, ResourceError> {
        self.get_collection("refills", &scope_query(scope)).await
    }

    async fn update_schedule_status(&self, update: &ScheduleUpdate) -> Result<(), ResourceError> {
        let url = self.url("schedule/update");
        let body = json!({
            "scheduleId": update.schedule_id,
            "status": update.status.as_str(),
        });

        let response = self
            .client
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await?;

        tracing::info!(
            schedule_id = %update.schedule_id,
            status = update.status.as_str(),
            "Status correction forwarded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_without_double_slash() {
        let source = HttpSource::new("http://upstream.local/api/", Duration::from_secs(5)).unwrap();
        assert_eq!(source.url("history"), "http://upstream.local/api/history");
        assert_eq!(source.url("/schedule/update"), "http://upstream.local/api/schedule/update");
    }

    #[test]
    fn scope_query_names_kind_and_viewer() {
        let scope = Scope::self_only(SubjectId::new("me"), None);
        let query = scope_query(&scope);
        assert_eq!(query[0], ("scope", "self".to_string()));
        assert_eq!(query[1], ("viewer", "me".to_string()));
    }
}
