#![deny(unsafe_code)]

pub mod config;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use crate::config::{DealflowConfig, TransportConfig};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use dealflow_adapters::{
    InMemoryDealRepository, InMemoryDirectory, MockTransport, ResendTransport,
};
use dealflow_core::{
    bootstrap_audit_store, AuditPage, AuditQuery, BulkDispatchReport, Contact, ContactId, Deal,
    DealId, DealStage, DealflowError, DispatchEngine, DispatchStatus, MessageTemplate,
    MessageTransport, NewDeal, OwnerId, PipelineEngine, PipelineStats, SenderIdentity,
    SingleDispatch, TransportError,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

pub const OWNER_HEADER: &str = "x-owner-id";
pub const SENDER_HEADER: &str = "x-sender-address";

#[derive(Clone)]
pub struct ServiceState {
    pub pipeline: Arc<PipelineEngine>,
    pub dispatch: Arc<DispatchEngine>,
    pub directory: Arc<InMemoryDirectory>,
}

impl ServiceState {
    pub async fn bootstrap(config: &DealflowConfig) -> Result<Self, ServiceError> {
        let transport: Arc<dyn MessageTransport> = match &config.transport {
            TransportConfig::Mock => Arc::new(MockTransport::new()),
            TransportConfig::Resend(resend) => Arc::new(ResendTransport::new(resend.clone())?),
        };
        Self::with_transport(config, transport).await
    }

    /// Assemble the engines around an already-built transport.
    pub async fn with_transport(
        config: &DealflowConfig,
        transport: Arc<dyn MessageTransport>,
    ) -> Result<Self, ServiceError> {
        let audit = bootstrap_audit_store(&config.storage).await?;
        let directory = Arc::new(InMemoryDirectory::new());
        let deals = Arc::new(InMemoryDealRepository::new());

        let pipeline = PipelineEngine::new(deals, directory.clone(), config.pipeline.clone());
        let dispatch = DispatchEngine::new(
            directory.clone(),
            transport,
            audit,
            config.dispatch.clone(),
        );

        Ok(Self {
            pipeline: Arc::new(pipeline),
            dispatch: Arc::new(dispatch),
            directory,
        })
    }
}

pub fn build_router(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/contacts", post(create_contact))
        .route("/v1/deals", post(create_deal))
        .route("/v1/deals/stats", get(pipeline_stats))
        .route("/v1/deals/by-stage/:stage", get(deals_by_stage))
        .route("/v1/deals/:id", get(get_deal))
        .route("/v1/deals/:id/stage", put(transition_stage))
        .route("/v1/deals/:id/activity", post(append_activity))
        .route("/v1/messages/send", post(send_message))
        .route("/v1/messages/bulk", post(send_bulk))
        .route("/v1/messages/template", post(send_template))
        .route("/v1/messages/history", get(history))
        .route("/v1/messages/history/:contact_id", get(contact_history))
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("core error: {0}")]
    Core(#[from] DealflowError),
    #[error("transport setup failed: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Http { status: StatusCode, message: String },
    #[error(transparent)]
    Core(#[from] DealflowError),
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn unauthorized(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }
}

fn core_status(err: &DealflowError) -> StatusCode {
    match err {
        DealflowError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        DealflowError::NotFound(_) => StatusCode::NOT_FOUND,
        DealflowError::Forbidden(_) => StatusCode::FORBIDDEN,
        DealflowError::DispatchFailed { .. } => StatusCode::BAD_GATEWAY,
        DealflowError::TransportUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        DealflowError::Storage(_) | DealflowError::Serialization(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Http { status, message } => {
                (status, Json(serde_json::json!({ "error": message }))).into_response()
            }
            ApiError::Core(err) => {
                let status = core_status(&err);
                if status.is_server_error() {
                    error!(status = status.as_u16(), error = %err, "Request failed");
                }
                (status, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
            }
        }
    }
}

fn owner_from(headers: &HeaderMap) -> Result<OwnerId, ApiError> {
    let raw = headers
        .get(OWNER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::unauthorized(format!("{OWNER_HEADER} header is required")))?;
    Ok(raw.parse()?)
}

fn sender_from(headers: &HeaderMap) -> Result<SenderIdentity, ApiError> {
    let owner = owner_from(headers)?;
    let address = headers
        .get(SENDER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("{SENDER_HEADER} header is required")))?;
    Ok(SenderIdentity::new(owner, address))
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    transport: &'static str,
    audit_backend: &'static str,
}

async fn health(State(state): State<ServiceState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "dealflow-service",
        transport: state.dispatch.provider(),
        audit_backend: state.dispatch.audit_backend(),
    })
}

#[derive(Debug, Clone, Deserialize)]
struct CreateContactRequest {
    first_name: String,
    last_name: String,
    email: String,
    phone: Option<String>,
    company: Option<String>,
    position: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

async fn create_contact(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(request): Json<CreateContactRequest>,
) -> Result<(StatusCode, Json<Contact>), ApiError> {
    let owner = owner_from(&headers)?;
    let mut contact = Contact::new(owner, request.first_name, request.last_name, request.email);
    contact.phone = request.phone;
    contact.company = request.company;
    contact.position = request.position;
    contact.tags = request.tags;

    let contact = state.directory.insert_contact(contact).await?;
    Ok((StatusCode::CREATED, Json(contact)))
}

#[derive(Debug, Clone, Deserialize)]
struct CreateDealRequest {
    title: String,
    value: f64,
    contact: String,
    stage: Option<String>,
    probability: Option<u8>,
    expected_close_date: Option<DateTime<Utc>>,
    notes: Option<String>,
}

async fn create_deal(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(request): Json<CreateDealRequest>,
) -> Result<(StatusCode, Json<Deal>), ApiError> {
    let owner = owner_from(&headers)?;
    let contact: ContactId = request.contact.parse()?;
    let stage = request
        .stage
        .as_deref()
        .map(DealStage::parse)
        .transpose()?;

    let mut new = NewDeal::new(request.title, request.value, contact);
    new.stage = stage;
    new.probability = request.probability;
    new.expected_close_date = request.expected_close_date;
    new.notes = request.notes;

    let deal = state.pipeline.create_deal(&owner, new).await?;
    Ok((StatusCode::CREATED, Json(deal)))
}

async fn get_deal(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Deal>, ApiError> {
    let owner = owner_from(&headers)?;
    let deal_id: DealId = id.parse()?;
    Ok(Json(state.pipeline.get_deal(&owner, &deal_id).await?))
}

async fn pipeline_stats(
    State(state): State<ServiceState>,
    headers: HeaderMap,
) -> Result<Json<PipelineStats>, ApiError> {
    let owner = owner_from(&headers)?;
    Ok(Json(state.pipeline.pipeline_stats(&owner).await?))
}

async fn deals_by_stage(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(stage): Path<String>,
) -> Result<Json<Vec<Deal>>, ApiError> {
    let owner = owner_from(&headers)?;
    let stage = DealStage::parse(&stage)?;
    Ok(Json(state.pipeline.deals_by_stage(&owner, stage).await?))
}

#[derive(Debug, Clone, Deserialize)]
struct StageRequest {
    #[serde(default)]
    stage: String,
}

async fn transition_stage(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<StageRequest>,
) -> Result<Json<Deal>, ApiError> {
    let owner = owner_from(&headers)?;
    let deal_id: DealId = id.parse()?;
    let deal = state
        .pipeline
        .transition_stage(&owner, &deal_id, &request.stage)
        .await?;
    Ok(Json(deal))
}

#[derive(Debug, Clone, Deserialize)]
struct ActivityRequest {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    description: String,
}

async fn append_activity(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<ActivityRequest>,
) -> Result<Json<Deal>, ApiError> {
    let owner = owner_from(&headers)?;
    let deal_id: DealId = id.parse()?;
    let deal = state
        .pipeline
        .append_activity(&owner, &deal_id, &request.kind, &request.description)
        .await?;
    Ok(Json(deal))
}

#[derive(Debug, Clone, Deserialize)]
struct SendRequest {
    contact_id: String,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    message: String,
}

async fn send_message(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(request): Json<SendRequest>,
) -> Result<Json<SingleDispatch>, ApiError> {
    let sender = sender_from(&headers)?;
    let contact_id: ContactId = request.contact_id.parse()?;
    let sent = state
        .dispatch
        .dispatch_single(&sender, &contact_id, &request.subject, &request.message)
        .await?;
    Ok(Json(sent))
}

#[derive(Debug, Clone, Deserialize)]
struct BulkRequest {
    #[serde(default)]
    contact_ids: Vec<String>,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    message: String,
}

async fn send_bulk(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(request): Json<BulkRequest>,
) -> Result<Json<BulkDispatchReport>, ApiError> {
    let sender = sender_from(&headers)?;
    let contact_ids = request
        .contact_ids
        .iter()
        .map(|id| id.parse::<ContactId>())
        .collect::<Result<Vec<_>, _>>()?;
    let report = state
        .dispatch
        .dispatch_bulk(&sender, &contact_ids, &request.subject, &request.message)
        .await?;
    Ok(Json(report))
}

#[derive(Debug, Clone, Deserialize)]
struct TemplateRequest {
    contact_id: String,
    template: String,
    #[serde(default)]
    data: BTreeMap<String, String>,
}

async fn send_template(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(request): Json<TemplateRequest>,
) -> Result<Json<SingleDispatch>, ApiError> {
    let sender = sender_from(&headers)?;
    let contact_id: ContactId = request.contact_id.parse()?;
    let template: MessageTemplate = request.template.parse()?;
    let sent = state
        .dispatch
        .dispatch_template(&sender, &contact_id, template, &request.data)
        .await?;
    Ok(Json(sent))
}

#[derive(Debug, Clone, Default, Deserialize)]
struct HistoryParams {
    page: Option<usize>,
    limit: Option<usize>,
    status: Option<String>,
}

impl HistoryParams {
    fn into_query(self, owner: OwnerId) -> Result<AuditQuery, ApiError> {
        let mut query =
            AuditQuery::for_sender(owner).paginate(self.page.unwrap_or(1), self.limit.unwrap_or(0));
        if let Some(status) = self.status.as_deref() {
            query = query.with_status(status.parse::<DispatchStatus>()?);
        }
        Ok(query)
    }
}

async fn history(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Query(params): Query<HistoryParams>,
) -> Result<Json<AuditPage>, ApiError> {
    let owner = owner_from(&headers)?;
    let query = params.into_query(owner)?;
    Ok(Json(state.dispatch.history(query).await?))
}

async fn contact_history(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(contact_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<AuditPage>, ApiError> {
    let owner = owner_from(&headers)?;
    let contact_id: ContactId = contact_id.parse()?;
    let query = params.into_query(owner)?.with_contact(contact_id);
    Ok(Json(state.dispatch.history(query).await?))
}
