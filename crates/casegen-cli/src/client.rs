//! Agent callbacks for the terminal driver

use async_trait::async_trait;
use casegen_core::types::{JsonRpcError, PermissionOutcome, RequestPermissionParams};
use casegen_core::{AgentClient, AutoApprove, Result};
use serde_json::Value;

/// Approves permission requests like [`AutoApprove`], reporting each one.
pub struct ConsoleClient;

#[async_trait]
impl AgentClient for ConsoleClient {
    async fn request_permission(&self, params: RequestPermissionParams) -> Result<PermissionOutcome> {
        println!("\n  [permission request]");
        for option in &params.options {
            println!("    - {} ({})", option.name, crate::render::wire_name(&option.kind));
        }
        let outcome = AutoApprove.request_permission(params).await?;
        match &outcome {
            PermissionOutcome::Selected { option_id } => println!("  -> auto-allowing: {}", option_id),
            PermissionOutcome::Cancelled => println!("  -> no allow option, cancelled"),
        }
        Ok(outcome)
    }

    async fn handle_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> std::result::Result<Value, JsonRpcError> {
        println!("\n  [incoming request] {}", method);
        let result = AutoApprove.handle_request(method, params).await;
        if result.is_err() {
            println!("  -> responded with method-not-supported");
        }
        result
    }
}
