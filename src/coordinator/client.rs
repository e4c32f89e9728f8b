use super::{Coordinator, CoordinatorError, PathfindingResponse};
use crate::types::{
    AgentIdentity, Hold, Location, Operation, OperationStatus, ScanRegion, Slot, Vec3,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

#[derive(Deserialize)]
struct RegisterResponse {
    agent: AgentIdentity,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum PollOperationResponse {
    OperationAvailable { operation: Operation },
    OperationUnavailable,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum FreeHoldResponse {
    HoldAcquired { hold: Hold },
    HoldUnavailable,
}

#[derive(Deserialize)]
struct HoldResponse {
    hold: Hold,
}

/// HTTP+JSON coordinator client.
///
/// Sends `X-Api-Key` on every request and `X-Agent-Id` on every agent-scoped
/// request.
pub struct HttpCoordinator {
    base_url: String,
    api_key: String,
    agent_id: String,
    http_client: Client,
}

impl HttpCoordinator {
    /// Register a new agent and return a client bound to its identity.
    pub async fn register(base_url: &str, api_key: &str) -> Result<(Self, AgentIdentity)> {
        let http_client = Client::new();
        let base_url = base_url.trim_end_matches('/').to_string();
        let endpoint = format!("{}/agent/register", base_url);

        let response = http_client
            .post(&endpoint)
            .header("X-Api-Key", api_key)
            .header("Content-Type", "application/json")
            .send()
            .await
            .context("Failed to send register request")?;
        let response = check_status(&endpoint, response).await?;
        let registered: RegisterResponse = response
            .json()
            .await
            .context("Failed to parse register response")?;

        let client = Self {
            base_url,
            api_key: api_key.to_string(),
            agent_id: registered.agent.id.clone(),
            http_client,
        };
        Ok((client, registered.agent))
    }

    /// Client for an already registered agent.
    pub fn with_identity(base_url: &str, api_key: &str, agent_id: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            agent_id: agent_id.to_string(),
            http_client: Client::new(),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    fn agent_url(&self, path: &str) -> String {
        format!("{}/agent/{}", self.base_url, path)
    }

    fn automation_url(&self, path: &str) -> String {
        format!("{}/automation/{}", self.base_url, path)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http_client
            .request(method, url)
            .header("X-Api-Key", &self.api_key)
            .header("Content-Type", "application/json")
    }

    fn agent_request(&self, method: Method, url: &str) -> RequestBuilder {
        self.request(method, url).header("X-Agent-Id", &self.agent_id)
    }

    /// POST a JSON body to an agent endpoint and return the checked response.
    async fn post_agent(&self, path: &str, body: Option<Value>) -> Result<Response> {
        let url = self.agent_url(path);
        let mut request = self.agent_request(Method::POST, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;
        check_status(&url, response).await
    }
}

/// Map non-2xx responses to `CoordinatorError::Status`.
async fn check_status(endpoint: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read body>".to_string());
    Err(CoordinatorError::Status {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        body,
    }
    .into())
}

#[async_trait]
impl Coordinator for HttpCoordinator {
    async fn heartbeat(&self) -> Result<()> {
        self.post_agent("heartbeat", None).await?;
        Ok(())
    }

    async fn alert(&self, description: &str) -> Result<()> {
        self.post_agent("alert", Some(json!({ "description": description })))
            .await?;
        Ok(())
    }

    async fn poll_operation(
        &self,
        location: Location,
        has_clear_inventory: bool,
    ) -> Result<Option<Operation>> {
        let response = self
            .post_agent(
                "poll_operation",
                Some(json!({
                    "location": location,
                    "has_clear_inventory": has_clear_inventory,
                })),
            )
            .await?;
        let poll: PollOperationResponse = response
            .json()
            .await
            .context("Failed to parse poll_operation response")?;

        Ok(match poll {
            PollOperationResponse::OperationAvailable { operation } => Some(operation),
            PollOperationResponse::OperationUnavailable => None,
        })
    }

    async fn operation_complete(&self, operation_id: &str, status: OperationStatus) -> Result<()> {
        self.post_agent(
            "operation_complete",
            Some(json!({
                "operation_id": operation_id,
                "final_status": status,
            })),
        )
        .await?;
        Ok(())
    }

    async fn inventory_scanned(
        &self,
        location: Location,
        slots: &[Slot],
        open_from: Vec3,
    ) -> Result<()> {
        debug!(location = %location, slot_count = slots.len(), "Uploading inventory snapshot");
        self.post_agent(
            "inventory_scanned",
            Some(json!({
                "location": location,
                "slots": slots,
                "open_from": open_from,
            })),
        )
        .await?;
        Ok(())
    }

    async fn get_hold(&self, hold_id: &str) -> Result<Hold> {
        let url = self.agent_url(&format!("hold/{}", hold_id));
        let response = self
            .agent_request(Method::GET, &url)
            .send()
            .await
            .context("Failed to send get_hold request")?;
        let response = check_status(&url, response).await?;
        let hold: HoldResponse = response
            .json()
            .await
            .context("Failed to parse hold response")?;
        Ok(hold.hold)
    }

    async fn acquire_free_hold(&self) -> Result<Option<Hold>> {
        let response = self.post_agent("hold/free", None).await?;
        let free: FreeHoldResponse = response
            .json()
            .await
            .context("Failed to parse free hold response")?;

        Ok(match free {
            FreeHoldResponse::HoldAcquired { hold } => Some(hold),
            FreeHoldResponse::HoldUnavailable => None,
        })
    }

    async fn release_hold(&self, hold_id: &str) -> Result<()> {
        // Release is the only call made without the agent header
        let url = self.automation_url(&format!("holds/{}", hold_id));
        let response = self
            .request(Method::DELETE, &url)
            .send()
            .await
            .context("Failed to send release_hold request")?;
        check_status(&url, response).await?;
        Ok(())
    }

    async fn find_path(&self, start: Location, end: Location) -> Result<PathfindingResponse> {
        let response = self
            .post_agent(
                "pathfinding",
                Some(json!({ "start_loc": start, "end_loc": end })),
            )
            .await?;
        response
            .json()
            .await
            .context("Failed to parse pathfinding response")
    }

    async fn send_sign_scan_data(&self, regions: &[ScanRegion]) -> Result<()> {
        self.post_agent("sign_scan_data", Some(json!({ "scan_regions": regions })))
            .await?;
        Ok(())
    }

    async fn sign_config(&self) -> Result<Value> {
        let url = self.automation_url("sign_config");
        let response = self
            .agent_request(Method::GET, &url)
            .send()
            .await
            .context("Failed to send sign_config request")?;
        let response = check_status(&url, response).await?;
        response
            .json()
            .await
            .context("Failed to parse sign_config response")
    }
}
