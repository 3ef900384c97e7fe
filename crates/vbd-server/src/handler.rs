use std::sync::Arc;

use axum::extract::rejection::{BytesRejection, JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};
use vbd_core::{
    BlobId, ClientSummary, ContractQuery, Directory, QueryOptions, SignatureRequest, UploadOutcome,
};

use crate::error::{ServerError, ServerResult};

/// Shared state of every handler.
pub type AppState = Arc<Directory>;

/// Health check handler.
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "name": "vbd-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /v1/clients`
pub async fn list_clients_handler(
    State(directory): State<AppState>,
) -> ServerResult<Json<Vec<ClientSummary>>> {
    Ok(Json(directory.list_clients().await?))
}

#[derive(Debug, Deserialize)]
pub struct RegisterClient {
    pub name: String,
    #[serde(default)]
    pub client_id: Option<String>,
}

/// `POST /v1/clients`
pub async fn register_client_handler(
    State(directory): State<AppState>,
    body: Result<Json<RegisterClient>, JsonRejection>,
) -> ServerResult<(StatusCode, Json<Value>)> {
    let Json(request) = body.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let client = directory
        .register_client(&request.name, request.client_id.as_deref())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "message": format!("Client {} registered.", client.client_id),
            "client": ClientSummary::from(&client),
        })),
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateContractParams {
    pub name: Option<String>,
    pub alias: Option<String>,
    pub contract_id: Option<String>,
}

/// `POST /v1/clients/:client_id/contracts`, body is the first version.
pub async fn create_contract_handler(
    State(directory): State<AppState>,
    Path(client_id): Path<String>,
    params: Result<Query<CreateContractParams>, QueryRejection>,
    body: Result<Bytes, BytesRejection>,
) -> ServerResult<Json<Value>> {
    let Query(params) = params?;
    let body = body?;
    let bytes = non_empty_body(&body)?;
    let name = params.name.as_deref().unwrap_or("default name");
    let alias = params.alias.as_deref().unwrap_or_default();
    let outcome = directory
        .create_contract(&client_id, params.contract_id.as_deref(), name, alias, bytes)
        .await?;
    Ok(Json(upload_response(&client_id, &outcome)))
}

/// `POST /v1/clients/:client_id/query`, body is JSON query options. An
/// empty body queries without filters.
pub async fn query_handler(
    State(directory): State<AppState>,
    Path(client_id): Path<String>,
    body: Result<Bytes, BytesRejection>,
) -> ServerResult<Json<ContractQuery>> {
    let body = body?;
    let options: QueryOptions = if body.iter().all(u8::is_ascii_whitespace) {
        QueryOptions::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ServerError::BadRequest(format!("invalid query options: {e}")))?
    };
    Ok(Json(directory.get_contracts(&client_id, &options).await?))
}

/// `POST /v1/sign`
pub async fn sign_handler(
    State(directory): State<AppState>,
    body: Result<Json<SignatureRequest>, JsonRejection>,
) -> ServerResult<Json<Value>> {
    let Json(request) = body.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let receipt = directory.acknowledge_signature(request).await?;
    Ok(Json(json!({
        "status": "success",
        "message": receipt.message,
        "receipt": receipt,
    })))
}

/// `POST /v1/clients/:client_id/versions/:blob_id`, body is the successor of
/// that version.
pub async fn upload_version_handler(
    State(directory): State<AppState>,
    Path((client_id, base)): Path<(String, String)>,
    body: Result<Bytes, BytesRejection>,
) -> ServerResult<Json<Value>> {
    let base = parse_blob_id(base)?;
    let body = body?;
    let bytes = non_empty_body(&body)?;
    let outcome = directory
        .upload_new_version_bytes(bytes, &client_id, &base)
        .await?;
    Ok(Json(upload_response(&client_id, &outcome)))
}

/// `GET /v1/clients/:client_id/versions/:blob_id/content`
pub async fn content_handler(
    State(directory): State<AppState>,
    Path((client_id, blob_id)): Path<(String, String)>,
) -> ServerResult<impl IntoResponse> {
    let blob_id = parse_blob_id(blob_id)?;
    let bytes = directory.fetch_version(&client_id, &blob_id).await?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], bytes))
}

fn parse_blob_id(raw: String) -> ServerResult<BlobId> {
    BlobId::new(raw).map_err(|e| ServerError::BadRequest(e.to_string()))
}

fn non_empty_body(body: &Bytes) -> ServerResult<&[u8]> {
    if body.is_empty() {
        return Err(ServerError::BadRequest("request body is empty".into()));
    }
    Ok(body.as_ref())
}

fn upload_response(client_id: &str, outcome: &UploadOutcome) -> Value {
    let message = match outcome {
        UploadOutcome::Created(record) => format!(
            "File uploaded successfully for client {client_id}. New version ID: {}",
            record.current_blob().id
        ),
        UploadOutcome::Deduplicated(record) => format!(
            "Content already stored as {}. No new version recorded.",
            record.current_blob().id
        ),
    };
    let mut body = json!({ "status": "success", "message": message });
    if let (Value::Object(map), Ok(Value::Object(outcome))) =
        (&mut body, serde_json::to_value(outcome))
    {
        map.extend(outcome);
    }
    body
}
