//! Webhook dispatcher — signed, at-least-once task-event delivery.
//!
//! Each delivery POSTs the payload to the task's callback URL with an
//! HMAC-SHA256 signature, a Unix timestamp, and a random nonce so receivers
//! can verify authenticity and reject replays. Failed attempts retry with
//! capped exponential backoff. The latest delivery state per task is held in
//! an in-memory table that concurrent callers can poll while a delivery is
//! still in progress; no lock is held across the network call or the
//! backoff wait.
//!
//! The dispatcher does not persist a retry queue across restarts — on
//! terminal failure the caller decides whether to re-enqueue or alert.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::Serialize;
use sha2::Sha256;

use hivemind_core::WebhookConfig;

use crate::error::{DispatchError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying `sha256=<hex(HMAC-SHA256(secret, payload))>`.
pub const SIGNATURE_HEADER: &str = "X-Hivemind-Signature";
/// Header carrying decimal Unix seconds at send time.
pub const TIMESTAMP_HEADER: &str = "X-Hivemind-Timestamp";
/// Header carrying a random 16-byte nonce, hex-encoded.
pub const NONCE_HEADER: &str = "X-Hivemind-Nonce";

/// Response bodies are captured up to this many bytes for error context.
const BODY_CAPTURE_LIMIT: usize = 1024;

/// Computes the backoff delay after a given failed attempt (1-based).
pub type BackoffFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;
/// Performs the backoff wait. Tests inject a no-op recorder here.
pub type SleepFn = Arc<dyn Fn(Duration) -> BoxFuture<'static, ()> + Send + Sync>;

/// A request to notify one task's callback URL.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub task_id: String,
    pub url: String,
    /// Opaque JSON payload; serialized once and signed byte-for-byte.
    pub payload: serde_json::Value,
    /// Overrides the dispatcher's default signing secret when set.
    pub secret: Option<String>,
}

impl DeliveryRequest {
    pub fn new(task_id: &str, url: &str, payload: serde_json::Value) -> Self {
        Self {
            task_id: task_id.to_string(),
            url: url.to_string(),
            payload,
            secret: None,
        }
    }

    /// Builder-style: sign with a per-request secret.
    pub fn with_secret(mut self, secret: &str) -> Self {
        self.secret = Some(secret.to_string());
        self
    }
}

/// Last-known delivery state for one task. Overwritten on every attempt —
/// it reflects the latest delivery cycle, not history.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryStatus {
    pub task_id: String,
    pub url: String,
    pub attempts: u32,
    pub delivered: bool,
    pub last_error: Option<String>,
    pub last_status_code: Option<u16>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub next_attempt: Option<DateTime<Utc>>,
}

/// Delivers signed webhook notifications with retry and backoff.
pub struct WebhookDispatcher {
    client: reqwest::Client,
    request_timeout: Duration,
    default_secret: Option<String>,
    max_retries: u32,
    backoff: BackoffFn,
    sleep: SleepFn,
    statuses: Mutex<HashMap<String, DeliveryStatus>>,
}

impl WebhookDispatcher {
    pub fn new(config: &WebhookConfig) -> Self {
        let cap_secs = config.backoff_cap_secs.max(1);
        let backoff: BackoffFn = Arc::new(move |attempt| {
            let exp = 1u64 << attempt.saturating_sub(1).min(31);
            Duration::from_secs(exp.min(cap_secs))
        });
        let sleep: SleepFn = Arc::new(|delay| Box::pin(tokio::time::sleep(delay)));
        Self {
            client: reqwest::Client::new(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            default_secret: (!config.signing_secret.is_empty())
                .then(|| config.signing_secret.clone()),
            max_retries: config.max_retries,
            backoff,
            sleep,
            statuses: Mutex::new(HashMap::new()),
        }
    }

    /// Builder-style: replace the backoff schedule.
    pub fn with_backoff(mut self, backoff: BackoffFn) -> Self {
        self.backoff = backoff;
        self
    }

    /// Builder-style: replace the wait primitive (tests run instantly).
    pub fn with_sleep(mut self, sleep: SleepFn) -> Self {
        self.sleep = sleep;
        self
    }

    /// Deliver one notification, retrying transient failures.
    ///
    /// Returns the final status on success, or `RetriesExhausted` once all
    /// attempts fail. Every intermediate status is published to the per-task
    /// table before any await, so `status()` polling always sees progress.
    pub async fn deliver(&self, request: DeliveryRequest) -> Result<DeliveryStatus> {
        if request.task_id.is_empty() {
            return Err(DispatchError::EmptyTaskId);
        }
        if request.url.is_empty() {
            return Err(DispatchError::EmptyUrl);
        }
        let secret = request
            .secret
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| self.default_secret.clone());
        let body = serde_json::to_vec(&request.payload)?;
        let total_attempts = self.max_retries + 1;

        let mut status = DeliveryStatus {
            task_id: request.task_id.clone(),
            url: request.url.clone(),
            attempts: 0,
            delivered: false,
            last_error: None,
            last_status_code: None,
            last_attempt: None,
            next_attempt: None,
        };

        for attempt in 1..=total_attempts {
            status.attempts = attempt;
            status.last_attempt = Some(Utc::now());
            status.next_attempt = None;
            self.publish(&status);

            match self.post(&request.url, &body, secret.as_deref()).await {
                Ok((code, _)) if (200..300).contains(&code) => {
                    status.delivered = true;
                    status.last_status_code = Some(code);
                    status.last_error = None;
                    self.publish(&status);
                    tracing::info!(
                        task = %request.task_id,
                        url = %request.url,
                        attempt,
                        "webhook delivered"
                    );
                    return Ok(status);
                }
                Ok((code, snippet)) => {
                    status.last_status_code = Some(code);
                    status.last_error = Some(format!("http {code}: {snippet}"));
                }
                Err(e) => {
                    status.last_status_code = None;
                    status.last_error = Some(e.to_string());
                }
            }

            tracing::warn!(
                task = %request.task_id,
                attempt,
                error = status.last_error.as_deref().unwrap_or(""),
                "webhook attempt failed"
            );

            // No sleep after the final attempt.
            if attempt < total_attempts {
                let delay = (self.backoff)(attempt);
                let delta =
                    chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
                status.next_attempt = Utc::now().checked_add_signed(delta);
                self.publish(&status);
                (self.sleep)(delay).await;
            }
        }

        status.delivered = false;
        self.publish(&status);
        Err(DispatchError::RetriesExhausted {
            attempts: total_attempts,
            last_error: status
                .last_error
                .unwrap_or_else(|| "unknown error".to_string()),
        })
    }

    /// Last-known delivery status for a task (defensive copy).
    pub fn status(&self, task_id: &str) -> Option<DeliveryStatus> {
        let statuses = self.statuses.lock().unwrap_or_else(|e| e.into_inner());
        statuses.get(task_id).cloned()
    }

    fn publish(&self, status: &DeliveryStatus) {
        let mut statuses = self.statuses.lock().unwrap_or_else(|e| e.into_inner());
        statuses.insert(status.task_id.clone(), status.clone());
    }

    /// One HTTP attempt. Returns the response status code and a capped body
    /// snippet; transport failures surface as `reqwest::Error`.
    async fn post(
        &self,
        url: &str,
        body: &[u8],
        secret: Option<&str>,
    ) -> std::result::Result<(u16, String), reqwest::Error> {
        let mut req = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .timeout(self.request_timeout)
            .body(body.to_vec());

        if let Some(secret) = secret {
            req = req
                .header(SIGNATURE_HEADER, sign(body, secret))
                .header(TIMESTAMP_HEADER, Utc::now().timestamp().to_string())
                .header(NONCE_HEADER, nonce());
        }

        let resp = req.send().await?;
        let code = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        Ok((code, cap_body(text)))
    }
}

/// Compute the signature header value for a payload: `sha256=<hex digest>`.
///
/// Receivers recompute this over the raw payload bytes and compare in
/// constant time. Exposed so collaborators and tests can verify deliveries.
pub fn sign(payload: &[u8], secret: &str) -> String {
    // HMAC-SHA256 accepts keys of any length, so this never fails.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC-SHA256 accepts any key length");
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Random 16-byte replay nonce, hex-encoded (32 chars).
fn nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn cap_body(mut body: String) -> String {
    if body.len() <= BODY_CAPTURE_LIMIT {
        return body;
    }
    let mut end = BODY_CAPTURE_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body.truncate(end);
    body
}
