//! Inbound routes. Handlers validate input, call the e-signature client and
//! map its results; token failures arrive as classified `ApiError`s.

use axum::{
    body::Bytes,
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::history::{HistoryQuery, NewHistoryEntry};
use crate::server::server::AppState;
use crate::upstream::payload::{build_template_payload, CreateDocumentRequest, PageContext};
use crate::upstream::sign_client::{UploadFile, UpstreamReply};
use crate::upstream::ApiError;

pub fn sign_router() -> Router<AppState> {
    Router::new()
        .route("/api/sign/templates", get(list_templates))
        .route("/api/sign/templates/{id}", get(get_template))
        .route("/api/sign/templates/{id}/createdocument", post(create_document))
        .route("/api/sign/upload", post(upload))
        .route("/api/sign/requests/status", get(request_statuses))
        .route("/api/sign/requests/{id}", get(get_request))
        .route("/api/sign/requests/{id}/documents", get(download_document))
        .route("/api/sign/requests/{id}/certificate", get(completion_certificate))
        .route("/api/sign/history", get(list_history).post(append_history))
        .route("/api/sign/diagnostics", get(diagnostics))
}

async fn list_templates(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let templates = state.sign.list_templates(&PageContext::default()).await?;
    Ok(Json(json!({ "templates": templates })))
}

async fn get_template(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let upstream = state.sign.get_template(&id).await?;
    let content_type = HeaderValue::from_str(&upstream.content_type)
        .unwrap_or(HeaderValue::from_static("application/json"));
    Ok((
        status_or_bad_gateway(upstream.status),
        [(header::CONTENT_TYPE, content_type)],
        upstream.body,
    )
        .into_response())
}

async fn create_document(
    State(state): State<AppState>,
    Path(template_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_lowercase();
    info!("create document from template {} ({})", template_id, content_type);

    let (reply, entry) = if content_type.contains("application/json") {
        let request: CreateDocumentRequest = serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {}", e)))?;
        let mut editable = request
            .editable
            .ok_or_else(|| ApiError::BadRequest("missing editable object in JSON body".to_owned()))?;
        let template_id = editable
            .template_id
            .get_or_insert_with(|| template_id.clone())
            .clone();

        let payload = build_template_payload(&editable);
        let reply = state.sign.create_from_template(&template_id, &payload).await?;
        let entry = NewHistoryEntry::from_reply(
            &template_id,
            editable.template_name.clone(),
            reply.status,
            payload,
            reply.json.as_ref(),
            &reply.text,
        );
        (reply, entry)
    } else if content_type.contains("application/x-www-form-urlencoded") {
        let raw = String::from_utf8(body.to_vec())
            .map_err(|_| ApiError::BadRequest("form body is not UTF-8".to_owned()))?;
        // form_urlencoded::parse already percent-decodes
        let parsed_data: Option<Value> = url::form_urlencoded::parse(raw.as_bytes())
            .find(|(k, _)| k == "data")
            .and_then(|(_, v)| serde_json::from_str(&v).ok());
        let template_name = parsed_data
            .as_ref()
            .and_then(|d| d.pointer("/templates/template_name").or_else(|| d.pointer("/templates/request_name")))
            .and_then(Value::as_str)
            .map(str::to_owned);
        let request_payload = parsed_data.unwrap_or_else(|| json!({ "raw": raw }));

        let reply = state.sign.create_from_template_raw(&template_id, raw).await?;
        let entry = NewHistoryEntry::from_reply(
            &template_id,
            template_name,
            reply.status,
            request_payload,
            reply.json.as_ref(),
            &reply.text,
        );
        (reply, entry)
    } else {
        return Err(ApiError::BadRequest(
            "unsupported content type, send application/json with { editable } or form-urlencoded data".to_owned(),
        ));
    };

    // history failures never fail the send itself
    if let Err(err) = state.history.append(entry).await {
        warn!("failed to record send history: {:#}", err);
    }

    Ok(reply_response(reply))
}

async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<Value>, ApiError> {
    let mut file: Option<UploadFile> = None;
    let mut data: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("document.pdf").to_owned();
                let content_type = field.content_type().map(str::to_owned);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("failed to read file: {}", e)))?;
                file = Some(UploadFile {
                    file_name,
                    content_type,
                    bytes,
                });
            }
            Some("data") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("failed to read data: {}", e)))?;
                data = Some(text);
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| ApiError::BadRequest("no file provided".to_owned()))?;
    let data = data
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("no data payload provided".to_owned()))?;

    let created = state.sign.create_request(file, data).await?;
    Ok(Json(created))
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    ids: Option<String>,
}

async fn request_statuses(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<Value>, ApiError> {
    let ids: Vec<String> = query
        .ids
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect();
    if ids.is_empty() {
        return Err(ApiError::BadRequest("ids query param required (comma separated)".to_owned()));
    }

    let results = state.sign.request_statuses(&ids).await?;
    Ok(Json(json!({ "ok": true, "results": results })))
}

async fn get_request(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let summary = state.sign.get_request(&id).await?;
    Ok(Json(json!({ "ok": true, "request": summary })))
}

async fn download_document(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let pdf = state.sign.download_document(&id).await?;
    Ok(pdf_attachment(&format!("signed-document-{}.pdf", file_safe(&id)), pdf))
}

async fn completion_certificate(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let pdf = state.sign.completion_certificate(&id).await?;
    Ok(pdf_attachment(&format!("certificate-{}.pdf", file_safe(&id)), pdf))
}

async fn list_history(State(state): State<AppState>, Query(query): Query<HistoryQuery>) -> Json<Value> {
    let items = state.history.list(&query).await;
    Json(json!({ "count": items.len(), "items": items }))
}

async fn append_history(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let entry: NewHistoryEntry = serde_json::from_slice(&body)
        .map_err(|_| ApiError::BadRequest("template_id required".to_owned()))?;
    if entry.template_id.as_deref().map_or(true, |t| t.trim().is_empty()) {
        return Err(ApiError::BadRequest("template_id required".to_owned()));
    }
    let entry = state.history.append(entry).await.map_err(ApiError::History)?;
    Ok((StatusCode::CREATED, Json(json!({ "ok": true, "entry": entry }))).into_response())
}

/// Credential presence (never values), endpoints, token and account checks.
async fn diagnostics(State(state): State<AppState>) -> Json<Value> {
    let mut report = json!({
        "timestamp": Utc::now().to_rfc3339(),
        "credentials": state.credentials.presence(),
        "endpoints": {
            "accounts_base": state.credentials.accounts_base_url.as_str(),
            "api_base": state.credentials.api_base_url.as_str(),
        },
    });

    match state.tokens.acquire_valid_token().await {
        Ok(_) => {
            report["token"] = json!({ "ok": true });
            report["account"] = match state.sign.verify_account().await {
                Ok(check) => json!(check),
                Err(err) => json!({ "verified": false, "error": err.to_string() }),
            };
        }
        Err(err) => {
            report["token"] = json!({ "ok": false, "kind": err.kind(), "error": err.to_string() });
        }
    }

    Json(report)
}

fn reply_response(reply: UpstreamReply) -> Response {
    let status = status_or_bad_gateway(reply.status);
    match reply.json {
        Some(json) => (status, Json(json)).into_response(),
        None => (status, reply.text).into_response(),
    }
}

fn pdf_attachment(file_name: &str, body: Bytes) -> Response {
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", file_name))
        .unwrap_or(HeaderValue::from_static("attachment"));
    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/pdf")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response()
}

fn file_safe(id: &str) -> String {
    id.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

fn status_or_bad_gateway(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY)
}
