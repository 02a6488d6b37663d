use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::types::{NewTask, Task, TaskGroup, TaskPatch};

use super::TaskService;

/// JSON client for the planner REST backend.
#[derive(Debug, Clone)]
pub struct RestTaskService {
    client: Client,
    base_url: String,
}

impl RestTaskService {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, segments: &[&str]) -> String {
        let path = segments
            .iter()
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/{}", self.base_url, path)
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let url = self.url(segments);
        debug!(%method, %url, "backend request");
        self.client.request(method, url)
    }

    async fn json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
        let response = send(request).await?;
        response
            .json::<T>()
            .await
            .context("failed to decode backend response")
    }
}

async fn send(request: RequestBuilder) -> Result<Response> {
    let response = request.send().await.context("backend request failed")?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    bail!("{url} returned {status}: {}", body.trim())
}

#[async_trait]
impl TaskService for RestTaskService {
    async fn list_groups(&self) -> Result<Vec<TaskGroup>> {
        Self::json(self.request(Method::GET, &["groups"])).await
    }

    async fn get_group(&self, group_id: &str) -> Result<TaskGroup> {
        Self::json(self.request(Method::GET, &["groups", group_id]))
            .await
            .with_context(|| format!("failed to load group {group_id}"))
    }

    async fn create_task(&self, task: NewTask) -> Result<Task> {
        Self::json(self.request(Method::POST, &["tasks"]).json(&task))
            .await
            .context("failed to create task")
    }

    async fn update_task(&self, task_id: &str, patch: TaskPatch) -> Result<Task> {
        Self::json(self.request(Method::PATCH, &["tasks", task_id]).json(&patch))
            .await
            .with_context(|| format!("failed to update task {task_id}"))
    }

    async fn delete_task(&self, task_id: &str) -> Result<()> {
        send(self.request(Method::DELETE, &["tasks", task_id]))
            .await
            .with_context(|| format!("failed to delete task {task_id}"))?;
        Ok(())
    }

    async fn delete_column(&self, column_id: &str) -> Result<()> {
        send(self.request(Method::DELETE, &["columns", column_id]))
            .await
            .with_context(|| format!("failed to delete column {column_id}"))?;
        Ok(())
    }
}
