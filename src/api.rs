//! Back-office REST client.
//!
//! [`RegisterApi`] is the seam between the session and the network: the
//! session is generic over it, [`HttpRegisterApi`] implements it with
//! `reqwest`, and tests plug in an in-memory ledger.

use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::TillConfig;
use crate::error::{RegisterError, Result};
use crate::history::ClosedDay;
use crate::models::{RegisterSnapshot, RegisterStatus, Transaction, TransactionKind};

const REGISTER_PATH: &str = "/api/cash-register";
const VAULT_TOTAL_PATH: &str = "/api/cash-register/vault/total";
const DAILY_CASH_PATH: &str = "/api/daily-cash/";

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Reduce an operator-entered address to the back-office base URL.
///
/// Operators often paste an endpoint (`host/api/cash-register/...`) instead
/// of the host. Every request path here starts with `/api`, so the base is
/// whatever precedes the first `api` path segment, without query, fragment
/// or trailing slashes. A bare host gets `http` when it is loopback and
/// `https` otherwise.
pub fn normalize_base_url(raw: &str) -> String {
    let raw = raw.trim();
    let mut url = if raw.contains("://") {
        raw.to_string()
    } else if is_loopback(raw) {
        format!("http://{raw}")
    } else {
        format!("https://{raw}")
    };

    if let Some(cut) = url.find(|c: char| c == '?' || c == '#') {
        url.truncate(cut);
    }
    if let Some(cut) = api_segment_start(&url) {
        url.truncate(cut);
    }
    url.trim_end_matches('/').to_string()
}

fn is_loopback(address: &str) -> bool {
    let host = address.split('/').next().unwrap_or(address);
    host == "localhost"
        || host.starts_with("localhost:")
        || host.starts_with("127.")
        || host.starts_with("[::1]")
}

/// Byte offset of the slash that opens the first `api` path segment.
fn api_segment_start(url: &str) -> Option<usize> {
    let authority = url.find("://")? + 3;
    let path_start = authority + url[authority..].find('/')?;
    let mut offset = 0;
    for segment in url[path_start..].split('/') {
        if segment == "api" {
            return Some(path_start + offset - 1);
        }
        offset += segment.len() + 1;
    }
    None
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenRegisterRequest {
    pub date: DateTime<Utc>,
    pub initial_amount_counted: Decimal,
    pub initial_amount_verified: bool,
    pub initial_count_time: DateTime<Utc>,
    pub notes: String,
    pub responsible: String,
    pub status: RegisterStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionRequest {
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CloseRegisterRequest {
    pub final_count: Decimal,
    pub notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CloseRegisterResponse {
    #[serde(default)]
    pub vault_total: Option<Decimal>,
}

#[derive(Deserialize)]
struct CreatedRegister {
    #[serde(default, alias = "_id")]
    id: Option<String>,
}

#[derive(Deserialize)]
struct TransactionsResponse {
    transactions: Vec<Transaction>,
}

#[derive(Deserialize)]
struct VaultTotalResponse {
    #[serde(default)]
    total: Option<Decimal>,
}

#[derive(Deserialize)]
struct DailyCashResponse {
    #[serde(default)]
    daily_cash: Vec<ClosedDay>,
}

// ---------------------------------------------------------------------------
// Backend seam
// ---------------------------------------------------------------------------

/// Endpoints the till consumes. One call per method, no retries.
#[allow(async_fn_in_trait)]
pub trait RegisterApi {
    /// Current safe balance.
    async fn vault_total(&self) -> Result<Decimal>;

    /// Create an open register for today; returns its id.
    async fn open_register(&self, request: &OpenRegisterRequest) -> Result<String>;

    /// Append a transaction; returns the register's full ledger.
    async fn add_transaction(
        &self,
        register_id: &str,
        request: &TransactionRequest,
    ) -> Result<Vec<Transaction>>;

    async fn close_register(
        &self,
        register_id: &str,
        request: &CloseRegisterRequest,
    ) -> Result<CloseRegisterResponse>;

    /// Raw spreadsheet bytes for the register.
    async fn export_report(&self, register_id: &str, format: &str) -> Result<Vec<u8>>;

    /// Registers whose date falls in `[start, end]`.
    async fn list_registers(&self, start: NaiveDate, end: NaiveDate)
        -> Result<Vec<RegisterSnapshot>>;

    /// Closed days, newest first as the back office sorts them.
    async fn closed_days(&self) -> Result<Vec<ClosedDay>>;
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into a user-friendly message.
fn friendly_error(url: &str, err: &reqwest::Error) -> RegisterError {
    let message = if err.is_connect() {
        format!("Cannot reach the back office at {url}")
    } else if err.is_timeout() {
        format!("Connection to {url} timed out")
    } else if err.is_builder() {
        format!("Invalid back-office URL: {url}")
    } else {
        format!("Network error communicating with {url}: {err}")
    };
    RegisterError::Network(message)
}

/// Generic message for a status code when the body carries nothing useful.
fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "Session expired, please sign in again".to_string(),
        403 => "Not authorized for this operation".to_string(),
        404 => "Cash register not found".to_string(),
        s if s >= 500 => "Back-office server error".to_string(),
        _ => "Unexpected response from the back office".to_string(),
    }
}

/// Build the error for a non-2xx response, preferring the server's own
/// `detail` (or `error` / `message`) text.
pub(crate) fn server_error(status: StatusCode, body_text: &str) -> RegisterError {
    let message = serde_json::from_str::<Value>(body_text)
        .ok()
        .and_then(|json| extract_detail(&json))
        .unwrap_or_else(|| status_error(status));
    RegisterError::Server {
        status: status.as_u16(),
        message,
    }
}

fn extract_detail(json: &Value) -> Option<String> {
    if let Some(detail) = json.get("detail") {
        if let Some(s) = detail.as_str() {
            return Some(s.trim().to_string()).filter(|s| !s.is_empty());
        }
        // Request validation errors: a list of `{ loc, msg, type }`.
        if let Some(items) = detail.as_array() {
            let joined = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("; ");
            if !joined.is_empty() {
                return Some(joined);
            }
        }
    }
    json.get("error")
        .or_else(|| json.get("message"))
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpRegisterApi {
    base: String,
    client: Client,
}

impl HttpRegisterApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RegisterError::Network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            base: normalize_base_url(base_url),
            client,
        })
    }

    pub fn from_config(config: &TillConfig) -> Result<Self> {
        Self::new(&config.api_url, config.timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// Send the request and turn transport failures and non-2xx statuses into
    /// [`RegisterError`]s.
    async fn execute(&self, request: RequestBuilder, path: &str) -> Result<Response> {
        let started = Instant::now();
        let resp = request
            .send()
            .await
            .map_err(|e| friendly_error(&self.base, &e))?;
        let status = resp.status();
        debug!(
            path,
            status = status.as_u16(),
            latency_ms = started.elapsed().as_millis() as u64,
            "back-office response"
        );

        if status.is_success() {
            return Ok(resp);
        }
        let body_text = resp.text().await.unwrap_or_default();
        let err = server_error(status, &body_text);
        warn!(path, status = status.as_u16(), error = %err, "back-office request rejected");
        Err(err)
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder, path: &str) -> Result<T> {
        let resp = self.execute(request, path).await?;
        let body_text = resp
            .text()
            .await
            .map_err(|e| friendly_error(&self.base, &e))?;
        serde_json::from_str(&body_text).map_err(|e| RegisterError::Decode(format!("{path}: {e}")))
    }
}

impl RegisterApi for HttpRegisterApi {
    async fn vault_total(&self) -> Result<Decimal> {
        let resp: VaultTotalResponse = self
            .json(self.client.get(self.url(VAULT_TOTAL_PATH)), VAULT_TOTAL_PATH)
            .await?;
        Ok(resp.total.unwrap_or(Decimal::ZERO))
    }

    async fn open_register(&self, request: &OpenRegisterRequest) -> Result<String> {
        let path = format!("{REGISTER_PATH}/");
        let created: CreatedRegister = self
            .json(self.client.post(self.url(&path)).json(request), &path)
            .await?;
        let id = created
            .id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| RegisterError::Decode("created register has no id".into()))?;
        info!(register_id = %id, counted = %request.initial_amount_counted, "Register opened");
        Ok(id)
    }

    async fn add_transaction(
        &self,
        register_id: &str,
        request: &TransactionRequest,
    ) -> Result<Vec<Transaction>> {
        let path = format!("{REGISTER_PATH}/{register_id}/transactions");
        let resp: TransactionsResponse = self
            .json(self.client.post(self.url(&path)).json(request), &path)
            .await?;
        Ok(resp.transactions)
    }

    async fn close_register(
        &self,
        register_id: &str,
        request: &CloseRegisterRequest,
    ) -> Result<CloseRegisterResponse> {
        let path = format!("{REGISTER_PATH}/{register_id}/close");
        self.json(self.client.post(self.url(&path)).json(request), &path)
            .await
    }

    async fn export_report(&self, register_id: &str, format: &str) -> Result<Vec<u8>> {
        let path = format!("{REGISTER_PATH}/{register_id}/export");
        let request = self
            .client
            .get(self.url(&path))
            .query(&[("format", format)]);
        let resp = self.execute(request, &path).await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| friendly_error(&self.base, &e))?;
        Ok(bytes.to_vec())
    }

    async fn list_registers(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RegisterSnapshot>> {
        let path = format!("{REGISTER_PATH}/");
        let request = self.client.get(self.url(&path)).query(&[
            ("start_date", start.format("%Y-%m-%d").to_string()),
            ("end_date", end.format("%Y-%m-%d").to_string()),
        ]);
        self.json(request, &path).await
    }

    async fn closed_days(&self) -> Result<Vec<ClosedDay>> {
        let resp: DailyCashResponse = self
            .json(self.client.get(self.url(DAILY_CASH_PATH)), DAILY_CASH_PATH)
            .await?;
        Ok(resp.daily_cash)
    }
}
