use anyhow::Context;
use async_trait::async_trait;
use phaseforge_common::{
    CommandResult, CreatedInstance, GeneratedFile, InstanceStatus, Issue, SandboxError,
    SandboxService,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::PhaseforgeToml;

#[derive(Debug, Serialize)]
struct CreateInstanceRequest<'a> {
    session_id: &'a str,
    template: &'a str,
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct WriteFilesRequest<'a> {
    files: &'a [GeneratedFile],
}

#[derive(Debug, Serialize)]
struct ExecuteCommandsRequest<'a> {
    commands: &'a [String],
}

#[derive(Debug, Deserialize)]
struct ExecuteCommandsResponse {
    #[serde(default)]
    results: Vec<CommandResult>,
}

#[derive(Debug, Deserialize)]
struct IssuesResponse {
    #[serde(default, alias = "errors")]
    issues: Vec<Issue>,
}

/// JSON-over-HTTP client for the sandbox service.
pub struct HttpSandboxClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpSandboxClient {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("phaseforge/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build sandbox HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(toml: &PhaseforgeToml) -> anyhow::Result<Self> {
        Self::new(
            &toml.sandbox_url(),
            toml.sandbox_token(),
            Duration::from_secs(toml.sandbox.request_timeout_secs),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn instance_url(&self, instance_id: &str, action: &str) -> String {
        self.url(&format!("instances/{}/{}", instance_id, action))
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, SandboxError> {
        let resp = self
            .authorized(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(SandboxError::Remote {
                status: status.as_u16(),
                message,
            });
        }

        resp.json::<T>()
            .await
            .context("Failed to parse sandbox response")
            .map_err(SandboxError::Other)
    }

    async fn send_empty(&self, request: reqwest::RequestBuilder) -> Result<(), SandboxError> {
        let resp = self
            .authorized(request)
            .send()
            .await
            .map_err(transport_error)?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(SandboxError::Remote {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

/// Connect and timeout failures mean the session is unreachable.
fn transport_error(err: reqwest::Error) -> SandboxError {
    if err.is_connect() || err.is_timeout() {
        SandboxError::Connection(err.to_string())
    } else {
        SandboxError::Other(anyhow::Error::new(err).context("Sandbox request failed"))
    }
}

#[async_trait]
impl SandboxService for HttpSandboxClient {
    async fn create_instance(
        &self,
        session_id: &str,
        template: &str,
        unique_name: &str,
    ) -> Result<CreatedInstance, SandboxError> {
        debug!(name = unique_name, template, "POST /instances");
        let body = CreateInstanceRequest {
            session_id,
            template,
            name: unique_name,
        };
        self.send(self.client.post(self.url("instances")).json(&body))
            .await
    }

    async fn get_status(&self, instance_id: &str) -> Result<InstanceStatus, SandboxError> {
        self.send(self.client.get(self.instance_url(instance_id, "status")))
            .await
    }

    async fn write_files(
        &self,
        instance_id: &str,
        files: &[GeneratedFile],
    ) -> Result<(), SandboxError> {
        debug!(instance = instance_id, count = files.len(), "PUT files");
        let body = WriteFilesRequest { files };
        self.send_empty(
            self.client
                .put(self.instance_url(instance_id, "files"))
                .json(&body),
        )
        .await
    }

    async fn execute_commands(
        &self,
        instance_id: &str,
        commands: &[String],
    ) -> Result<Vec<CommandResult>, SandboxError> {
        let body = ExecuteCommandsRequest { commands };
        let resp: ExecuteCommandsResponse = self
            .send(
                self.client
                    .post(self.instance_url(instance_id, "commands"))
                    .json(&body),
            )
            .await?;
        Ok(resp.results)
    }

    async fn get_errors(&self, instance_id: &str) -> Result<Vec<Issue>, SandboxError> {
        let resp: IssuesResponse = self
            .send(self.client.get(self.instance_url(instance_id, "errors")))
            .await?;
        Ok(resp.issues)
    }

    async fn static_analysis(&self, instance_id: &str) -> Result<Vec<Issue>, SandboxError> {
        let resp: IssuesResponse = self
            .send(self.client.post(self.instance_url(instance_id, "analysis")))
            .await?;
        Ok(resp.issues)
    }
}
