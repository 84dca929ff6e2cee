use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use futures::future::join_all;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::manager::TokenManager;
use crate::observability::metrics::get_metrics;
use crate::sources::RefreshTokenSource;
use crate::upstream::errors::ApiError;
use crate::upstream::payload::PageContext;

pub type SharedTokenManager = Arc<TokenManager<RefreshTokenSource>>;

/// Provider error code for "account not found in the signing product".
pub const ACCOUNT_NOT_FOUND_CODE: i64 = 9004;

static ERROR_MSG: &'static str = "error";

/// Upstream caller for the e-signature REST API.
///
/// Every call authorizes through the shared token manager only.
#[derive(Clone)]
pub struct SignClient {
    http: Client,
    api_base: Url,
    accounts_base: Url,
    auth_scheme: String,
    tokens: SharedTokenManager,
}

/// Upstream response forwarded as-is.
#[derive(Debug, Clone)]
pub struct Passthrough {
    pub status: u16,
    pub content_type: String,
    pub body: Bytes,
}

/// Upstream response that may or may not be JSON.
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: u16,
    pub json: Option<Value>,
    pub text: String,
}

/// File part of a new signature request.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestSummary {
    pub overall_status: Option<Value>,
    pub sign_percentage: Option<Value>,
    pub timestamps: RequestTimestamps,
    pub recipients: Vec<Recipient>,
    pub raw: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestTimestamps {
    pub created: Option<Value>,
    pub modified: Option<Value>,
    pub action: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recipient {
    pub id: Option<Value>,
    pub name: Option<Value>,
    pub email: Option<Value>,
    pub status: Option<Value>,
    pub order: Option<Value>,
    pub fields: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountCheck {
    pub verified: bool,
    pub email: Option<String>,
    pub user_info_status: Option<u16>,
    pub sign_status: u16,
    pub code: Option<i64>,
    pub warning: Option<String>,
}

impl SignClient {
    pub fn new(http: Client, api_base: Url, accounts_base: Url, auth_scheme: String, tokens: SharedTokenManager) -> Self {
        Self {
            http,
            api_base,
            accounts_base,
            auth_scheme,
            tokens,
        }
    }

    /// Build the shared outbound client.
    pub fn build_http_client(timeout: Duration) -> anyhow::Result<Client> {
        Ok(Client::builder().timeout(timeout).build()?)
    }

    pub async fn list_templates(&self, page: &PageContext) -> Result<Vec<Value>, ApiError> {
        let url = self.api_url(&["templates"])?;
        let data = serde_json::to_string(&json!({ "page_context": page }))
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        let request = self.http.get(url).query(&[("data", data)]);
        let response = self.send("list_templates", request).await?;
        let reply = read_reply(response).await?;
        let json = expect_success(reply, "failed to fetch templates")?;
        Ok(json
            .get("templates")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    pub async fn get_template(&self, id: &str) -> Result<Passthrough, ApiError> {
        let url = self.api_url(&["templates", id])?;
        let response = self.send("get_template", self.http.get(url)).await?;
        passthrough(response).await
    }

    /// Quick-send a document from a template with a shaped payload.
    pub async fn create_from_template(&self, id: &str, payload: &Value) -> Result<UpstreamReply, ApiError> {
        let data = serde_json::to_string(payload).map_err(|e| ApiError::BadRequest(e.to_string()))?;
        let url = self.api_url(&["templates", id, "createdocument"])?;
        let request = self
            .http
            .post(url)
            .form(&[("data", data.as_str()), ("is_quicksend", "true")]);
        let response = self.send("create_from_template", request).await?;
        read_reply(response).await
    }

    /// Forward an already form-encoded body unchanged.
    pub async fn create_from_template_raw(&self, id: &str, form_body: String) -> Result<UpstreamReply, ApiError> {
        let url = self.api_url(&["templates", id, "createdocument"])?;
        let request = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded;charset=UTF-8")
            .body(form_body);
        let response = self.send("create_from_template", request).await?;
        read_reply(response).await
    }

    /// New signature request from an uploaded document.
    pub async fn create_request(&self, file: UploadFile, data: String) -> Result<Value, ApiError> {
        let mut part = Part::bytes(file.bytes.to_vec()).file_name(file.file_name.clone());
        if let Some(content_type) = &file.content_type {
            part = part
                .mime_str(content_type)
                .map_err(|e| ApiError::BadRequest(format!("invalid file content type: {}", e)))?;
        }
        let form = Form::new().part("file", part).text("data", data);
        let url = self.api_url(&["requests"])?;
        info!("creating signature request from '{}' ({} bytes)", file.file_name, file.bytes.len());

        let response = self.send("create_request", self.http.post(url).multipart(form)).await?;
        let upstream_request_id = response
            .headers()
            .get("x-request-id")
            .or_else(|| response.headers().get("x-zoho-request-id"))
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let reply = read_reply(response).await?;
        if !is_success(reply.status) {
            warn!(
                "create request rejected, status {}, upstream request id {:?}",
                reply.status, upstream_request_id
            );
        }
        let json = expect_success(reply, "create request failed")?;
        if json.is_null() {
            // success status with an unparseable body
            return Err(ApiError::Upstream {
                status: 502,
                message: "failed to parse e-signature API response".to_owned(),
                body: Value::Null,
            });
        }
        Ok(json)
    }

    pub async fn get_request(&self, id: &str) -> Result<RequestSummary, ApiError> {
        let url = self.api_url(&["requests", id])?;
        let response = self.send("get_request", self.http.get(url)).await?;
        let reply = read_reply(response).await?;
        let json = expect_success(reply, "request lookup failed")?;
        Ok(normalize_request(&json))
    }

    /// Status of several requests. Per-id failures are reported in place.
    pub async fn request_statuses(&self, ids: &[String]) -> Result<Map<String, Value>, ApiError> {
        let token = self.tokens.acquire_valid_token().await?;
        let authorization = token.authorization_value(&self.auth_scheme);

        let lookups = ids.iter().map(|id| {
            let authorization = authorization.clone();
            async move {
                let url = match self.api_url(&["requests", id.as_str()]) {
                    Ok(url) => url,
                    Err(e) => return (id.clone(), json!({ "id": id, "ok": false, "error": e.to_string() })),
                };
                let request = self.http.get(url).header(AUTHORIZATION, authorization);
                let result = match self.dispatch("request_status", request).await {
                    Ok(response) => match read_reply(response).await {
                        Ok(reply) => status_summary(id, &reply),
                        Err(e) => json!({ "id": id, "ok": false, "error": e.to_string() }),
                    },
                    Err(e) => json!({ "id": id, "ok": false, "error": e.to_string() }),
                };
                (id.clone(), result)
            }
        });

        Ok(join_all(lookups).await.into_iter().collect())
    }

    pub async fn download_document(&self, id: &str) -> Result<Bytes, ApiError> {
        let url = self.api_url(&["requests", id, "pdf"])?;
        let response = self.send("download_document", self.http.get(url)).await?;
        binary(response, "failed to fetch signed document").await
    }

    pub async fn completion_certificate(&self, id: &str) -> Result<Bytes, ApiError> {
        let url = self.api_url(&["requests", id, "completioncertificate"])?;
        let response = self.send("completion_certificate", self.http.get(url)).await?;
        binary(response, "failed to fetch certificate").await
    }

    /// Check that the token's account exists on both the accounts server and the signing product.
    ///
    /// Code 9004 only means the signing product has no profile for the account yet;
    /// requests may still succeed, so it is reported as a warning.
    pub async fn verify_account(&self) -> Result<AccountCheck, ApiError> {
        let info_url = crate::config::credentials::join_base(&self.accounts_base, "/oauth/user/info")
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let (user_info_status, info_email) = match self.send("user_info", self.http.get(info_url)).await {
            Ok(response) => {
                let reply = read_reply(response).await?;
                let email = reply
                    .json
                    .as_ref()
                    .and_then(|j| j.get("Email").or_else(|| j.get("email")))
                    .and_then(Value::as_str)
                    .map(str::to_owned);
                (Some(reply.status), email)
            }
            Err(ApiError::Token(err)) => return Err(ApiError::Token(err)),
            Err(e) => {
                warn!("accounts user info lookup failed: {}", e);
                (None, None)
            }
        };

        let self_url = self.api_url(&["users", "self"])?;
        let reply = read_reply(self.send("users_self", self.http.get(self_url)).await?).await?;
        let json = reply.json.clone().unwrap_or(Value::Null);
        let code = json.get("code").and_then(Value::as_i64);

        if is_success(reply.status) {
            let email = json
                .pointer("/users/0/email")
                .or_else(|| json.get("email"))
                .and_then(Value::as_str)
                .map(str::to_owned)
                .or(info_email);
            info!("e-signature account verified: {:?}", email);
            return Ok(AccountCheck {
                verified: true,
                email,
                user_info_status,
                sign_status: reply.status,
                code,
                warning: None,
            });
        }

        if code == Some(ACCOUNT_NOT_FOUND_CODE) {
            warn!("account not found in the e-signature product (9004), continuing");
            return Ok(AccountCheck {
                verified: false,
                email: info_email,
                user_info_status,
                sign_status: reply.status,
                code,
                warning: Some("account not found in the e-signature product; activate it by signing in once".to_owned()),
            });
        }

        Err(upstream_error(reply, "failed to verify e-signature account"))
    }

    fn api_url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Transport(format!("api base '{}' cannot carry a path", self.api_base)))?
            .pop_if_empty()
            .extend(["api", "v1"])
            .extend(segments);
        Ok(url)
    }

    /// Authorize and send.
    async fn send(&self, operation: &'static str, request: RequestBuilder) -> Result<Response, ApiError> {
        let token = self.tokens.acquire_valid_token().await?;
        debug!("{}: using access token {}…", operation, token.preview());
        let request = request.header(AUTHORIZATION, token.authorization_value(&self.auth_scheme));
        self.dispatch(operation, request).await
    }

    async fn dispatch(&self, operation: &'static str, request: RequestBuilder) -> Result<Response, ApiError> {
        let metrics = get_metrics().await;
        let start = Instant::now();
        let result = request.send().await;
        metrics
            .upstream_duration
            .with_label_values(&[operation])
            .observe(start.elapsed().as_secs_f64());
        match result {
            Ok(response) => {
                let class = status_class(response.status().as_u16());
                metrics.upstream_requests.with_label_values(&[operation, class]).inc();
                info!("{}: e-signature API responded {}", operation, response.status());
                Ok(response)
            }
            Err(err) => {
                metrics.upstream_requests.with_label_values(&[operation, ERROR_MSG]).inc();
                warn!("{}: e-signature API call failed: {}", operation, err);
                Err(ApiError::from(err))
            }
        }
    }
}

pub fn normalize_request(json: &Value) -> RequestSummary {
    let r = json.get("requests").unwrap_or(json);
    let field = |name: &str| r.get(name).filter(|v| !v.is_null()).cloned();

    let recipients = r
        .get("actions")
        .and_then(Value::as_array)
        .map(|actions| {
            actions
                .iter()
                .map(|a| Recipient {
                    id: a.get("action_id").cloned(),
                    name: a.get("recipient_name").cloned(),
                    email: a.get("recipient_email").cloned(),
                    status: a.get("action_status").or_else(|| a.get("status")).cloned(),
                    order: a.get("signing_order").cloned(),
                    fields: a.get("fields").cloned().unwrap_or_else(|| json!([])),
                })
                .collect()
        })
        .unwrap_or_default();

    RequestSummary {
        overall_status: field("request_status").or_else(|| field("status")),
        sign_percentage: field("sign_percentage"),
        timestamps: RequestTimestamps {
            created: field("created_time"),
            modified: field("modified_time"),
            action: field("action_time"),
        },
        recipients,
        raw: r.clone(),
    }
}

fn status_summary(id: &str, reply: &UpstreamReply) -> Value {
    let json = reply.json.as_ref();
    let pick = |pointer: &str| json.and_then(|j| j.pointer(pointer)).filter(|v| !v.is_null()).cloned();
    let status = pick("/request_status")
        .or_else(|| pick("/requests/request_status"))
        .or_else(|| pick("/requests/status"))
        .or_else(|| pick("/status"))
        .unwrap_or_else(|| {
            if reply.status == 200 {
                json!("ok")
            } else {
                json!(format!("http_{}", reply.status))
            }
        });
    let actions = pick("/actions").or_else(|| pick("/requests/actions"));
    json!({
        "id": id,
        "ok": true,
        "status": status,
        "actions": actions,
        "raw": json.cloned().unwrap_or_else(|| Value::String(reply.text.clone())),
        "http_status": reply.status,
    })
}

async fn read_reply(response: Response) -> Result<UpstreamReply, ApiError> {
    let status = response.status().as_u16();
    let text = response.text().await?;
    let json = serde_json::from_str(&text).ok();
    Ok(UpstreamReply { status, json, text })
}

/// JSON body of a success reply (Null when not JSON), otherwise an upstream error.
fn expect_success(reply: UpstreamReply, context: &str) -> Result<Value, ApiError> {
    if is_success(reply.status) {
        Ok(reply.json.unwrap_or(Value::Null))
    } else {
        Err(upstream_error(reply, context))
    }
}

fn upstream_error(reply: UpstreamReply, context: &str) -> ApiError {
    let message = reply
        .json
        .as_ref()
        .and_then(|j| j.get("message"))
        .and_then(Value::as_str)
        .map(|m| format!("{}: {}", context, m))
        .unwrap_or_else(|| context.to_owned());
    ApiError::Upstream {
        status: reply.status,
        message,
        body: reply.json.unwrap_or(Value::String(reply.text)),
    }
}

async fn passthrough(response: Response) -> Result<Passthrough, ApiError> {
    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/json")
        .to_owned();
    let body = response.bytes().await?;
    Ok(Passthrough {
        status,
        content_type,
        body,
    })
}

async fn binary(response: Response, context: &str) -> Result<Bytes, ApiError> {
    if response.status().is_success() {
        Ok(response.bytes().await?)
    } else {
        Err(upstream_error(read_reply(response).await?, context))
    }
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

fn status_class(status: u16) -> &'static str {
    match status {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_nested_request() {
        let json = json!({
            "code": 0,
            "requests": {
                "request_status": "inprogress",
                "sign_percentage": 50,
                "created_time": 1700000000000u64,
                "actions": [
                    { "action_id": "a1", "recipient_name": "Ada", "recipient_email": "ada@example.com", "action_status": "SIGNED", "signing_order": 1 },
                    { "action_id": "a2", "recipient_name": "Bob", "status": "UNOPENED" }
                ]
            }
        });
        let summary = normalize_request(&json);
        assert_eq!(summary.overall_status, Some(json!("inprogress")));
        assert_eq!(summary.sign_percentage, Some(json!(50)));
        assert!(summary.timestamps.modified.is_none());
        assert_eq!(summary.recipients.len(), 2);
        assert_eq!(summary.recipients[0].status, Some(json!("SIGNED")));
        assert_eq!(summary.recipients[1].status, Some(json!("UNOPENED")));
        assert_eq!(summary.recipients[1].fields, json!([]));
    }

    #[test]
    fn status_falls_back_to_http_code() {
        let reply = UpstreamReply {
            status: 404,
            json: None,
            text: "not found".to_owned(),
        };
        let summary = status_summary("r1", &reply);
        assert_eq!(summary["status"], "http_404");
        assert_eq!(summary["raw"], "not found");

        let reply = UpstreamReply {
            status: 200,
            json: Some(json!({ "requests": { "status": "completed" } })),
            text: String::new(),
        };
        assert_eq!(status_summary("r1", &reply)["status"], "completed");
    }
}
