//! reqwest-backed transport for the assistants-style REST API.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::wire::{
    CreateRunBody, PostMessageBody, SubmitApprovalsBody, SubmitOutputsBody, WireList, WireMessage,
    WireRun, WireStep, WireThread,
};
use super::RunTransport;
use crate::config::OrchestratorConfig;
use crate::error::{AgentRunError, Result};
use crate::types::{Message, Run, RunStep, ToolApproval, ToolOutput};

/// HTTP client for the run service. Cheap to clone and share.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    api_version: Option<String>,
}

impl HttpTransport {
    /// Build a transport from orchestrator configuration.
    pub fn new(config: &OrchestratorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(10)
            .build()?;
        Ok(Self {
            client,
            base_url: config.require_endpoint()?.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_version: config.api_version.clone(),
        })
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.api_key {
            if let Ok(val) = HeaderValue::from_str(&format!("Bearer {key}")) {
                headers.insert(AUTHORIZATION, val);
            }
        }
        headers
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut builder = self.client.request(method, url).headers(self.headers());
        if let Some(version) = &self.api_version {
            builder = builder.query(&[("api-version", version)]);
        }
        builder
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        if !(200..300).contains(&status) {
            return Err(status_to_error(status, &body));
        }
        serde_json::from_str(&body)
            .map_err(|e| AgentRunError::Protocol(format!("undecodable response body: {e}")))
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.send(self.request(Method::POST, path).json(body)).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        self.send(self.request(Method::GET, path).query(query)).await
    }

    /// Walk an ascending list endpoint page by page using the `after` cursor.
    async fn get_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut query = vec![("order", "asc"), ("limit", PAGE_LIMIT)];
            if let Some(after) = cursor.as_deref() {
                query.push(("after", after));
            }
            let page: WireList<T> = self.get(path, &query).await?;
            items.extend(page.data);
            if !page.has_more {
                break;
            }
            match page.last_id {
                Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
                _ => break,
            }
        }
        Ok(items)
    }
}

const PAGE_LIMIT: &str = "100";
const RECENT_RUNS_LIMIT: &str = "20";

#[async_trait]
impl RunTransport for HttpTransport {
    async fn create_thread(&self) -> Result<String> {
        let thread: WireThread = self.post("threads", &serde_json::json!({})).await?;
        debug!(thread_id = %thread.id, "Created thread");
        Ok(thread.id)
    }

    async fn post_message(&self, thread_id: &str, content: &str) -> Result<()> {
        let _: serde_json::Value = self
            .post(
                &format!("threads/{thread_id}/messages"),
                &PostMessageBody {
                    role: "user",
                    content,
                },
            )
            .await?;
        Ok(())
    }

    async fn create_run(&self, thread_id: &str, agent_id: &str) -> Result<Run> {
        let run: WireRun = self
            .post(
                &format!("threads/{thread_id}/runs"),
                &CreateRunBody {
                    assistant_id: agent_id,
                },
            )
            .await?;
        with_thread(run, thread_id)
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        let run: WireRun = self
            .get(&format!("threads/{thread_id}/runs/{run_id}"), &[])
            .await?;
        with_thread(run, thread_id)
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .post(
                &format!("threads/{thread_id}/runs/{run_id}/cancel"),
                &serde_json::json!({}),
            )
            .await?;
        Ok(())
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<()> {
        let _: serde_json::Value = self
            .post(
                &format!("threads/{thread_id}/runs/{run_id}/submit_tool_outputs"),
                &SubmitOutputsBody::new(outputs),
            )
            .await?;
        Ok(())
    }

    async fn submit_approvals(
        &self,
        thread_id: &str,
        run_id: &str,
        approvals: &[ToolApproval],
    ) -> Result<()> {
        let _: serde_json::Value = self
            .post(
                &format!("threads/{thread_id}/runs/{run_id}/submit_tool_outputs"),
                &SubmitApprovalsBody::new(approvals),
            )
            .await?;
        Ok(())
    }

    async fn list_runs(&self, thread_id: &str) -> Result<Vec<Run>> {
        let list: WireList<WireRun> = self
            .get(
                &format!("threads/{thread_id}/runs"),
                &[("order", "desc"), ("limit", RECENT_RUNS_LIMIT)],
            )
            .await?;
        list.data
            .into_iter()
            .map(|run| with_thread(run, thread_id))
            .collect()
    }

    async fn list_steps(&self, thread_id: &str, run_id: &str) -> Result<Vec<RunStep>> {
        let steps: Vec<WireStep> = self
            .get_all(&format!("threads/{thread_id}/runs/{run_id}/steps"))
            .await?;
        Ok(steps.into_iter().map(RunStep::from).collect())
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>> {
        let messages: Vec<WireMessage> = self
            .get_all(&format!("threads/{thread_id}/messages"))
            .await?;
        messages.into_iter().map(WireMessage::into_message).collect()
    }
}

fn with_thread(mut run: WireRun, thread_id: &str) -> Result<Run> {
    if run.thread_id.is_empty() {
        run.thread_id = thread_id.to_string();
    }
    run.into_run()
}

/// Map a non-2xx HTTP status to an error.
pub fn status_to_error(status: u16, body: &str) -> AgentRunError {
    let message = extract_error_message(body).unwrap_or_else(|| body.to_string());
    match status {
        401 | 403 => AgentRunError::Authentication(message),
        _ => AgentRunError::api(status, message),
    }
}

fn extract_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
}
