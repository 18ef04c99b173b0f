// REST implementation of the draft persistence contract
//
// Thin client over the CRM backend's onboarding endpoints. Transient failures (network, 5xx)
// are retried with exponential backoff + jitter; contract failures surface immediately.

use async_trait::async_trait;
use log::{info, warn};
use reqwest::StatusCode;
use std::future::Future;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use url::Url;
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::persistence::draft::{DraftService, DraftSnapshot};

#[derive(Debug, Clone)]
pub struct HttpDraftServiceOptions {
    pub request_timeout: Duration,
    pub retry_max_attempts: usize,
}

impl Default for HttpDraftServiceOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(12),
            retry_max_attempts: 3,
        }
    }
}

pub struct HttpDraftService {
    client: reqwest::Client,
    base: Url,
    options: HttpDraftServiceOptions,
}

impl HttpDraftService {
    pub fn new(base_url: &str, options: HttpDraftServiceOptions) -> Result<Self, PersistenceError> {
        let base = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| PersistenceError::Network(format!("invalid base URL: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| PersistenceError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base,
            options,
        })
    }

    // Url normalizes a bare authority to a trailing "/"; trim so joins stay predictable.
    fn base_str(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    fn drafts_url(&self) -> String {
        format!("{}/onboarding/drafts", self.base_str())
    }

    fn draft_url(&self, draft_id: &str) -> String {
        format!("{}/onboarding/drafts/{}", self.base_str(), draft_id)
    }

    fn finalize_url(&self, draft_id: &str) -> String {
        format!("{}/onboarding/drafts/{}/finalize", self.base_str(), draft_id)
    }

    async fn with_retry<T, F, Fut>(&self, operation: F) -> Result<T, PersistenceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PersistenceError>>,
    {
        let strategy = ExponentialBackoff::from_millis(150)
            .factor(2)
            .max_delay(Duration::from_secs(2))
            .take(self.options.retry_max_attempts)
            .map(jitter);

        RetryIf::spawn(strategy, operation, |e: &PersistenceError| {
            let transient = e.is_transient();
            if transient {
                warn!("[PHASE: autosave] [STEP: http_retry] Transient failure, retrying: {e}");
            }
            transient
        })
        .await
    }
}

fn map_status(status: StatusCode, draft_id: Option<&str>) -> PersistenceError {
    if status == StatusCode::NOT_FOUND {
        PersistenceError::NotFound(draft_id.unwrap_or("?").to_string())
    } else {
        PersistenceError::Status(status.as_u16())
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateDraftResponse {
    id: String,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinalizeResponse {
    persisted_entity_id: String,
}

#[async_trait]
impl DraftService for HttpDraftService {
    async fn create_draft(&self) -> Result<String, PersistenceError> {
        let url = self.drafts_url();
        let correlation_id = Uuid::new_v4().to_string();

        let created: CreateDraftResponse = self
            .with_retry(|| async {
                let resp = self
                    .client
                    .post(&url)
                    .header("x-correlation-id", &correlation_id)
                    .send()
                    .await
                    .map_err(|e| PersistenceError::Network(e.to_string()))?;
                if !resp.status().is_success() {
                    return Err(map_status(resp.status(), None));
                }
                resp.json()
                    .await
                    .map_err(|e| PersistenceError::Decode(e.to_string()))
            })
            .await?;

        info!(
            "[PHASE: autosave] [STEP: draft_create] Draft {} allocated (correlation: {})",
            created.id, correlation_id
        );
        Ok(created.id)
    }

    async fn update_draft(
        &self,
        draft_id: &str,
        snapshot: &DraftSnapshot,
    ) -> Result<(), PersistenceError> {
        let url = self.draft_url(draft_id);
        self.with_retry(|| async {
            let resp = self
                .client
                .put(&url)
                .json(snapshot)
                .send()
                .await
                .map_err(|e| PersistenceError::Network(e.to_string()))?;
            if !resp.status().is_success() {
                return Err(map_status(resp.status(), Some(draft_id)));
            }
            Ok(())
        })
        .await
    }

    async fn load_draft(&self, draft_id: &str) -> Result<DraftSnapshot, PersistenceError> {
        let url = self.draft_url(draft_id);
        self.with_retry(|| async {
            let resp = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| PersistenceError::Network(e.to_string()))?;
            if !resp.status().is_success() {
                return Err(map_status(resp.status(), Some(draft_id)));
            }
            resp.json()
                .await
                .map_err(|e| PersistenceError::Decode(e.to_string()))
        })
        .await
    }

    async fn finalize(
        &self,
        draft_id: &str,
        snapshot: &DraftSnapshot,
    ) -> Result<String, PersistenceError> {
        // Terminal operation: no automatic retry, the caller owns the decision to resubmit.
        let url = self.finalize_url(draft_id);
        let resp = self
            .client
            .post(&url)
            .json(snapshot)
            .send()
            .await
            .map_err(|e| PersistenceError::Network(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(map_status(resp.status(), Some(draft_id)));
        }
        let finalized: FinalizeResponse = resp
            .json()
            .await
            .map_err(|e| PersistenceError::Decode(e.to_string()))?;
        info!(
            "[PHASE: finalize] [STEP: submit] Draft {} finalized as entity {}",
            draft_id, finalized.persisted_entity_id
        );
        Ok(finalized.persisted_entity_id)
    }
}
