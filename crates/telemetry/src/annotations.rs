//! Event annotations for collector streams
//!
//! Annotations mark point-in-time events (deploys, config pushes, restarts)
//! on a named stream so they can be overlaid on charts. The client is
//! deliberately simpler than the metrics path: one POST per event, no
//! retry, with per-client counters and last-failure capture so callers can
//! surface delivery health without inspecting every call site.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header;
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::{TelemetryError, TelemetryResult};

/// Outcome of one completed annotation exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationResponse {
    /// HTTP status returned by the collector
    pub status: u16,
    /// Response headers, with non-UTF-8 values skipped
    pub headers: HashMap<String, String>,
    /// Response body
    pub body: String,
}

impl AnnotationResponse {
    /// Whether the collector accepted the annotation.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Delivery counters and last-failure details for one client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationStats {
    /// Annotations that completed an HTTP exchange, any status
    pub sent: u64,
    /// Exchanges that never completed
    pub error_count: u64,
    /// Message of the most recent transport failure
    pub last_error: Option<String>,
    /// Completed exchanges with a non-2xx status
    pub non_200_count: u64,
    /// Status of the most recent non-2xx response
    pub last_non_200_status: Option<u16>,
    /// Body of the most recent non-2xx response
    pub last_non_200_body: Option<String>,
}

#[derive(Debug, Default)]
struct LastFailures {
    error: Option<String>,
    non_200_status: Option<u16>,
    non_200_body: Option<String>,
}

/// HTTP client for posting annotations to collector streams.
#[derive(Debug)]
pub struct AnnotationClient {
    client: reqwest::Client,
    base_url: String,
    auth_header: String,
    defaults: Map<String, Value>,
    sent: AtomicU64,
    error_count: AtomicU64,
    non_200_count: AtomicU64,
    last: Mutex<LastFailures>,
}

impl AnnotationClient {
    /// Build a client for a collector annotation endpoint.
    ///
    /// `defaults` are merged into every annotation body. A single trailing
    /// slash on `base_url` is tolerated and trimmed.
    ///
    /// # Errors
    ///
    /// `Configuration` when the key is empty or the base URL is not an
    /// absolute URL.
    pub fn new(
        key: impl Into<String>,
        base_url: impl Into<String>,
        defaults: Map<String, Value>,
    ) -> TelemetryResult<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(TelemetryError::Configuration(
                "annotation key must not be empty".to_string(),
            ));
        }
        let base_url = base_url.into();
        Url::parse(&base_url).map_err(|err| {
            TelemetryError::Configuration(format!("invalid base url {base_url:?}: {err}"))
        })?;
        let base_url = base_url.strip_suffix('/').unwrap_or(&base_url).to_string();

        // Key as the Basic-auth username, empty password.
        let auth_header = format!("Basic {}", BASE64.encode(format!("{key}:")));

        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            auth_header,
            defaults,
            sent: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            non_200_count: AtomicU64::new(0),
            last: Mutex::new(LastFailures::default()),
        })
    }

    /// Post one annotation to `stream`.
    ///
    /// The body starts as the current epoch-seconds start time plus
    /// `title`, then the client defaults, then `options`, with later
    /// entries winning on key collisions. Passing a `title` key in the
    /// defaults or options therefore overrides the `title` argument.
    ///
    /// # Errors
    ///
    /// `Transport` when the exchange never completes. A non-2xx status is
    /// `Ok`; inspect the response.
    #[instrument(skip(self, options))]
    pub async fn send(
        &self,
        stream: &str,
        title: &str,
        options: Map<String, Value>,
    ) -> TelemetryResult<AnnotationResponse> {
        let mut body = Map::new();
        body.insert("start_time".to_string(), Value::from(chrono::Utc::now().timestamp()));
        body.insert("title".to_string(), Value::from(title));
        for (key, value) in &self.defaults {
            body.insert(key.clone(), value.clone());
        }
        for (key, value) in options {
            body.insert(key, value);
        }

        let url = format!("{}/{stream}", self.base_url);
        let result = self
            .client
            .post(&url)
            .header(header::AUTHORIZATION, self.auth_header.as_str())
            .json(&body)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(err) => return Err(self.record_error(err)),
        };

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => return Err(self.record_error(err)),
        };

        self.sent.fetch_add(1, Ordering::Relaxed);
        if (200..300).contains(&status) {
            debug!(stream, status, "annotation delivered");
        } else {
            warn!(stream, status, body = %body, "annotation rejected");
            self.non_200_count.fetch_add(1, Ordering::Relaxed);
            let mut last = self.lock_last();
            last.non_200_status = Some(status);
            last.non_200_body = Some(body.clone());
        }

        Ok(AnnotationResponse { status, headers, body })
    }

    /// Counters and last-failure details accumulated so far.
    pub fn stats(&self) -> AnnotationStats {
        let last = self.lock_last();
        AnnotationStats {
            sent: self.sent.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            last_error: last.error.clone(),
            non_200_count: self.non_200_count.load(Ordering::Relaxed),
            last_non_200_status: last.non_200_status,
            last_non_200_body: last.non_200_body.clone(),
        }
    }

    fn record_error(&self, err: reqwest::Error) -> TelemetryError {
        warn!(error = %err, "annotation delivery failed");
        self.error_count.fetch_add(1, Ordering::Relaxed);
        self.lock_last().error = Some(err.to_string());
        TelemetryError::from(err)
    }

    fn lock_last(&self) -> MutexGuard<'_, LastFailures> {
        match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
