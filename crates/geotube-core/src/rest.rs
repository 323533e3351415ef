use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::RestStoreConfig;
use crate::model::{
    IssueId, IssueResolution, LoadMetric, NewConnectivityIssue, NewUser, NewWatchSession,
    SessionClose, SessionId, UserId,
};
use crate::store::{RemoteStore, StoreError};

const USERS: &str = "users";
const SESSIONS: &str = "video_sessions";
const LOAD_METRICS: &str = "video_load_metrics";
const ISSUES: &str = "connection_issues";

#[derive(Debug, Deserialize)]
pub(crate) struct IdRow {
    id: serde_json::Value,
}

impl IdRow {
    // PostgREST hands back uuid or bigint keys depending on the table definition.
    pub(crate) fn into_string(self) -> String {
        match self.id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        }
    }
}

/// PostgREST client for the four tracking tables.
pub struct RestStore {
    client: Client,
    config: RestStoreConfig,
}

impl RestStore {
    pub fn new(config: RestStoreConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
    }

    async fn checked(response: Result<Response, reqwest::Error>) -> Result<Response, StoreError> {
        let response = response.map_err(|err| StoreError::Http(err.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, StoreError> {
        response
            .json::<T>()
            .await
            .map_err(|err| StoreError::Decode(err.to_string()))
    }

    async fn insert_returning_id<B: Serialize + ?Sized>(
        &self,
        table: &str,
        body: &B,
    ) -> Result<String, StoreError> {
        let request = self
            .authed(self.client.post(self.config.table_url(table)))
            .header("Prefer", "return=representation")
            .query(&[("select", "id")])
            .json(body);
        let response = Self::checked(request.send().await).await?;
        let rows: Vec<IdRow> = Self::decode(response).await?;
        rows.into_iter()
            .next()
            .map(IdRow::into_string)
            .ok_or_else(|| StoreError::Decode(format!("{table} insert returned no rows")))
    }

    async fn update_by_id<B: Serialize + ?Sized>(
        &self,
        table: &str,
        id: &str,
        body: &B,
    ) -> Result<(), StoreError> {
        let filter = format!("eq.{id}");
        let request = self
            .authed(self.client.patch(self.config.table_url(table)))
            .query(&[("id", filter.as_str())])
            .json(body);
        Self::checked(request.send().await).await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for RestStore {
    async fn find_user(&self, session_token: &str) -> Result<Option<UserId>, StoreError> {
        let filter = format!("eq.{session_token}");
        let request = self
            .authed(self.client.get(self.config.table_url(USERS)))
            .query(&[("select", "id"), ("session_id", filter.as_str()), ("limit", "1")]);
        let response = Self::checked(request.send().await).await?;
        let rows: Vec<IdRow> = Self::decode(response).await?;
        Ok(rows.into_iter().next().map(|row| UserId(row.into_string())))
    }

    async fn touch_user(&self, id: &UserId, last_seen: DateTime<Utc>) -> Result<(), StoreError> {
        self.update_by_id(USERS, &id.0, &json!({ "last_seen": last_seen }))
            .await
    }

    async fn create_user(&self, user: &NewUser) -> Result<UserId, StoreError> {
        self.insert_returning_id(USERS, user).await.map(UserId)
    }

    async fn insert_session(&self, session: &NewWatchSession) -> Result<SessionId, StoreError> {
        self.insert_returning_id(SESSIONS, session)
            .await
            .map(SessionId)
    }

    async fn close_session(&self, id: &SessionId, close: &SessionClose) -> Result<(), StoreError> {
        self.update_by_id(SESSIONS, &id.0, close).await
    }

    async fn insert_load_metric(&self, metric: &LoadMetric) -> Result<(), StoreError> {
        let request = self
            .authed(self.client.post(self.config.table_url(LOAD_METRICS)))
            .header("Prefer", "return=minimal")
            .json(metric);
        Self::checked(request.send().await).await?;
        Ok(())
    }

    async fn insert_issue(&self, issue: &NewConnectivityIssue) -> Result<IssueId, StoreError> {
        self.insert_returning_id(ISSUES, issue).await.map(IssueId)
    }

    async fn resolve_issue(
        &self,
        id: &IssueId,
        resolution: &IssueResolution,
    ) -> Result<(), StoreError> {
        self.update_by_id(ISSUES, &id.0, resolution).await
    }
}
