//! Typed request and response bodies for the five operations.
//!
//! Requests are parsed from the callable `data` value; any shape mismatch
//! is an `InvalidArgument`. Unknown fields are ignored.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use plangate_store::store::validate_document_id;

use super::error::GatewayError;

/// Parse a request body into its typed schema.
///
/// The body must be a JSON object; serde would otherwise accept a
/// positional array for a struct.
pub fn parse_request<T: DeserializeOwned>(body: Value) -> Result<T, GatewayError> {
    if !body.is_object() {
        return Err(GatewayError::invalid_argument());
    }
    serde_json::from_value(body).map_err(|_| GatewayError::invalid_argument())
}

/// Plan ids must be valid store document ids.
pub(crate) fn check_plan_id(plan_id: &str) -> Result<(), GatewayError> {
    validate_document_id(plan_id).map_err(|_| GatewayError::invalid_argument())
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlanRequest {
    #[serde(default)]
    pub plan_name: Option<String>,
    pub plan_type: String,
    #[serde(default)]
    pub form_data: Option<Map<String, Value>>,
}

/// Body of `read_plan` and `delete_plan`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanIdRequest {
    pub plan_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlanRequest {
    pub plan_id: String,
    pub plan_name: String,
    #[serde(default)]
    pub details: Option<Map<String, Value>>,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlanResponse {
    pub success: bool,
    pub message: String,
    pub plan_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadPlanResponse {
    pub success: bool,
    /// Every stored plan field, plus `details` when the details document exists.
    pub plan: Map<String, Value>,
}

/// Response of `update_plan` and `delete_plan`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

/// One entry of `list_plans`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub id: String,
    pub plan_name: Value,
    pub plan_type: Value,
    pub form_data: Value,
    pub last_updated: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListPlansResponse {
    pub success: bool,
    pub plans: Vec<PlanSummary>,
}
