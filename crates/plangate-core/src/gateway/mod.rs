//! The plan gateway: five stateless operations over a [`DocumentStore`].
//!
//! Every operation runs the same sequence: authenticate, parse the typed
//! request, issue one or two store calls, shape the response. Store failures
//! are logged here and surface to the caller only as a fixed `Internal`
//! message.
//!
//! `read_plan` (plan, then details) and `delete_plan` (details, then plan)
//! are two independent store calls. A concurrent write between them can be
//! observed as a torn read, and a failure between the two deletes leaves the
//! plan without its details.

pub mod error;
pub mod operation;
pub mod types;

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info};

use plangate_store::{CollectionPath, DocumentRef, DocumentStore, StoreError, WriteFields};

use crate::identity::Identity;

pub use error::{ErrorKind, GatewayError};
pub use operation::Operation;
pub use types::{
    CreatePlanRequest, CreatePlanResponse, ListPlansResponse, MessageResponse, PlanIdRequest,
    PlanSummary, ReadPlanResponse, UpdatePlanRequest,
};

use types::{check_plan_id, parse_request};

/// Name given to plans created without one.
pub const DEFAULT_PLAN_NAME: &str = "Untitled Plan";

/// Sub-collection holding a plan's details singleton.
pub const DETAILS_COLLECTION: &str = "details";

/// Id of the details singleton.
pub const DETAILS_DOC_ID: &str = "main";

/// The `users/{uid}/plans` collection of one caller.
pub fn plans_collection(uid: &str) -> CollectionPath {
    CollectionPath::root("users").doc(uid).collection("plans")
}

/// The details singleton of a plan.
pub fn details_doc(plan: &DocumentRef) -> DocumentRef {
    plan.collection(DETAILS_COLLECTION).doc(DETAILS_DOC_ID)
}

fn authenticate(op: Operation, caller: Option<&Identity>) -> Result<&Identity, GatewayError> {
    caller.ok_or_else(|| GatewayError::unauthenticated(op))
}

/// Log a store failure and replace it with the operation's generic error.
fn internal(op: Operation, uid: &str, err: StoreError) -> GatewayError {
    let prefix = op.internal_message().trim_end_matches('.');
    error!(operation = %op, uid, "{prefix}: {err}");
    GatewayError::internal(op)
}

/// Serialize a response for the transport envelope.
fn to_value<T: Serialize>(op: Operation, response: T) -> Result<Value, GatewayError> {
    serde_json::to_value(response).map_err(|e| {
        error!(operation = %op, "failed to serialize response: {e}");
        GatewayError::internal(op)
    })
}

/// Authorization-and-validation gateway for per-user plans.
#[derive(Clone)]
pub struct PlanGateway {
    store: Arc<dyn DocumentStore>,
}

impl PlanGateway {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Invoke `op` by name with a raw request body.
    pub async fn call(
        &self,
        op: Operation,
        caller: Option<&Identity>,
        body: Value,
    ) -> Result<Value, GatewayError> {
        match op {
            Operation::CreatePlan => to_value(op, self.create_plan(caller, body).await?),
            Operation::ReadPlan => to_value(op, self.read_plan(caller, body).await?),
            Operation::UpdatePlan => to_value(op, self.update_plan(caller, body).await?),
            Operation::DeletePlan => to_value(op, self.delete_plan(caller, body).await?),
            Operation::ListPlans => to_value(op, self.list_plans(caller).await?),
        }
    }

    /// Create a plan with a store-generated id.
    pub async fn create_plan(
        &self,
        caller: Option<&Identity>,
        body: Value,
    ) -> Result<CreatePlanResponse, GatewayError> {
        let op = Operation::CreatePlan;
        let caller = authenticate(op, caller)?;
        let req: CreatePlanRequest = parse_request(body)?;

        let fields = WriteFields::new()
            .with(
                "planName",
                req.plan_name.unwrap_or_else(|| DEFAULT_PLAN_NAME.to_owned()),
            )
            .with("planType", req.plan_type)
            .with("formData", req.form_data.unwrap_or_default())
            .with_server_timestamp("createdAt")
            .with_server_timestamp("lastUpdated");

        let doc = self
            .store
            .create(&plans_collection(&caller.uid), &fields)
            .await
            .map_err(|e| internal(op, &caller.uid, e))?;

        info!(uid = %caller.uid, plan_id = %doc.id, "plan created");
        Ok(CreatePlanResponse {
            success: true,
            message: "Plan created successfully.".to_owned(),
            plan_id: doc.id,
        })
    }

    /// Fetch a plan, merging in its details when they exist.
    pub async fn read_plan(
        &self,
        caller: Option<&Identity>,
        body: Value,
    ) -> Result<ReadPlanResponse, GatewayError> {
        let op = Operation::ReadPlan;
        let caller = authenticate(op, caller)?;
        let req: PlanIdRequest = parse_request(body)?;
        check_plan_id(&req.plan_id)?;

        let plan_ref = plans_collection(&caller.uid).doc(req.plan_id);
        let plan = self
            .store
            .get(&plan_ref)
            .await
            .map_err(|e| internal(op, &caller.uid, e))?
            .ok_or_else(GatewayError::not_found)?;

        let mut fields = plan.to_json_map();

        let details = self
            .store
            .get(&details_doc(&plan_ref))
            .await
            .map_err(|e| internal(op, &caller.uid, e))?;
        if let Some(details) = details {
            fields.insert("details".to_owned(), Value::Object(details.to_json_map()));
        }

        Ok(ReadPlanResponse {
            success: true,
            plan: fields,
        })
    }

    /// Rename a plan and optionally merge-patch its details.
    pub async fn update_plan(
        &self,
        caller: Option<&Identity>,
        body: Value,
    ) -> Result<MessageResponse, GatewayError> {
        let op = Operation::UpdatePlan;
        let caller = authenticate(op, caller)?;
        let req: UpdatePlanRequest = parse_request(body)?;
        check_plan_id(&req.plan_id)?;

        let plan_ref = plans_collection(&caller.uid).doc(req.plan_id);
        let fields = WriteFields::new()
            .with("planName", req.plan_name)
            .with_server_timestamp("lastUpdated");

        self.store
            .update(&plan_ref, &fields)
            .await
            .map_err(|e| internal(op, &caller.uid, e))?;

        if let Some(details) = req.details {
            self.store
                .set_merge(&details_doc(&plan_ref), &WriteFields::from(details))
                .await
                .map_err(|e| internal(op, &caller.uid, e))?;
        }

        info!(uid = %caller.uid, plan_id = %plan_ref.id, "plan updated");
        Ok(MessageResponse {
            success: true,
            message: "Plan updated successfully.".to_owned(),
        })
    }

    /// Delete a plan's details, then the plan. Idempotent.
    pub async fn delete_plan(
        &self,
        caller: Option<&Identity>,
        body: Value,
    ) -> Result<MessageResponse, GatewayError> {
        let op = Operation::DeletePlan;
        let caller = authenticate(op, caller)?;
        let req: PlanIdRequest = parse_request(body)?;
        check_plan_id(&req.plan_id)?;

        let plan_ref = plans_collection(&caller.uid).doc(req.plan_id);

        self.store
            .delete(&details_doc(&plan_ref))
            .await
            .map_err(|e| internal(op, &caller.uid, e))?;
        self.store
            .delete(&plan_ref)
            .await
            .map_err(|e| internal(op, &caller.uid, e))?;

        info!(uid = %caller.uid, plan_id = %plan_ref.id, "plan deleted");
        Ok(MessageResponse {
            success: true,
            message: "Plan deleted successfully.".to_owned(),
        })
    }

    /// Summaries of every plan owned by the caller, oldest first.
    pub async fn list_plans(
        &self,
        caller: Option<&Identity>,
    ) -> Result<ListPlansResponse, GatewayError> {
        let op = Operation::ListPlans;
        let caller = authenticate(op, caller)?;

        let docs = self
            .store
            .list(&plans_collection(&caller.uid))
            .await
            .map_err(|e| internal(op, &caller.uid, e))?;

        let field = |doc: &plangate_store::Document, name: &str| {
            doc.get(name).map(|v| v.to_json()).unwrap_or(Value::Null)
        };

        let plans = docs
            .iter()
            .map(|doc| PlanSummary {
                id: doc.id.clone(),
                plan_name: field(doc, "planName"),
                plan_type: field(doc, "planType"),
                form_data: doc
                    .get("formData")
                    .map(|v| v.to_json())
                    .unwrap_or_else(|| Value::Object(Map::new())),
                last_updated: field(doc, "lastUpdated"),
            })
            .collect();

        Ok(ListPlansResponse {
            success: true,
            plans,
        })
    }
}
