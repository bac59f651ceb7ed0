//! Circuit-break control message.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// Identity of the relay instance a pause request targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerTarget {
    pub function_app_name: String,
    pub function_name: String,
    pub resource_group_name: String,
}

/// Request asking the external controller to pause the relay
///
/// Serialized as `{ FunctionAppName, FunctionName, ResourceGroupName,
/// DisableFunction, DisablePeriodMinutes }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CircuitBreakRequest {
    pub function_app_name: String,
    pub function_name: String,
    pub resource_group_name: String,
    pub disable_function: bool,
    pub disable_period_minutes: u32,
}

impl CircuitBreakRequest {
    /// Build a disable request; `disable_function` is always `true`.
    pub fn disable(target: &BreakerTarget, disable_period_minutes: u32) -> Self {
        Self {
            function_app_name: target.function_app_name.clone(),
            function_name: target.function_name.clone(),
            resource_group_name: target.resource_group_name.clone(),
            disable_function: true,
            disable_period_minutes,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// JSON payload, base64-encoded for the side channel
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        Ok(STANDARD.encode(self.to_json()?.as_bytes()))
    }

    /// Inverse of [`CircuitBreakRequest::encode`], used by consumers of the side channel
    pub fn decode(encoded: &[u8]) -> Result<Self, String> {
        let json = STANDARD
            .decode(encoded)
            .map_err(|e| format!("Invalid base64 payload: {}", e))?;
        serde_json::from_slice(&json).map_err(|e| format!("Invalid control message: {}", e))
    }
}
