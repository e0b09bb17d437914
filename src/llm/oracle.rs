use crate::error::{ReconcileError, Result};
use crate::llm::client::GeminiClient;
use crate::llm::prompts::*;
use crate::llm::types::{Content, DocumentPayload};
use crate::llm::utils::{for_fiscal_year, with_focus_pages};
use crate::oracle::{
    parse_oracle_json, response_schema, EpsResponse, ExtractionOracle, PageLocatorResponse,
    RetryPolicy, SingleMetricResponse, YearsResponse,
};
use log::{debug, info};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::runtime::{Builder, Runtime};

pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";

/// [`ExtractionOracle`] backed by the Gemini API.
///
/// Owns a current-thread runtime so callers stay synchronous. Each report is
/// read (or uploaded) once and reused for all five calls.
pub struct GeminiOracle {
    client: GeminiClient,
    model: String,
    runtime: Runtime,
    retry: RetryPolicy,
    use_response_schema: bool,
    documents: Mutex<HashMap<PathBuf, DocumentPayload>>,
}

impl GeminiOracle {
    pub fn new(client: GeminiClient, model: impl Into<String>) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            client,
            model: model.into(),
            runtime,
            retry: RetryPolicy::default(),
            use_response_schema: false,
            documents: Mutex::new(HashMap::new()),
        })
    }

    /// Reads the key from `GEMINI_API_KEY`, falling back to `GOOGLE_API_KEY`.
    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("GOOGLE_API_KEY"))
            .map_err(|_| {
                ReconcileError::InvalidConfig(
                    "GEMINI_API_KEY or GOOGLE_API_KEY must be set".to_string(),
                )
            })?;
        Self::new(GeminiClient::new(api_key), model)
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sends the response type's JSON schema with every request instead of
    /// relying on the prompt alone.
    pub fn with_response_schema(mut self, enabled: bool) -> Self {
        self.use_response_schema = enabled;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn cached_document(&self, source: &Path) -> Result<Option<DocumentPayload>> {
        let documents = self
            .documents
            .lock()
            .map_err(|_| ReconcileError::OracleFailed("document cache poisoned".to_string()))?;
        Ok(documents.get(source).cloned())
    }

    fn remember_document(&self, source: &Path, document: DocumentPayload) -> Result<()> {
        self.documents
            .lock()
            .map_err(|_| ReconcileError::OracleFailed("document cache poisoned".to_string()))?
            .insert(source.to_path_buf(), document);
        Ok(())
    }

    async fn document(&self, source: &Path) -> Result<DocumentPayload> {
        if let Some(document) = self.cached_document(source)? {
            return Ok(document);
        }
        let document = self.client.prepare_document(source).await?;
        self.remember_document(source, document.clone())?;
        Ok(document)
    }

    fn call<T>(&self, label: &str, source: &Path, system_prompt: &str) -> Result<T>
    where
        T: DeserializeOwned + Default + JsonSchema,
    {
        let schema = if self.use_response_schema {
            Some(response_schema::<T>()?)
        } else {
            None
        };
        let label = format!("{} {}", label, source.display());

        let raw = self.retry.run(&label, |attempt| {
            debug!("{}: attempt {}", label, attempt);
            self.runtime.block_on(async {
                let document = self.document(source).await?;
                let messages = vec![Content::user_with_document(USER_PROMPT_DOCUMENT, &document)];
                self.client
                    .generate_content(&self.model, system_prompt, messages, schema.clone())
                    .await
            })
        })?;

        Ok(parse_oracle_json(&raw))
    }
}

impl ExtractionOracle for GeminiOracle {
    fn locate_pages(&self, source: &Path) -> Result<PageLocatorResponse> {
        let located: PageLocatorResponse = self.call("locate", source, SYSTEM_PROMPT_LOCATOR)?;
        info!(
            "Located statements in {}: P&L {:?}, balance sheet {:?}, EPS {:?}",
            source.display(),
            located.income_statement_pages,
            located.balance_sheet_pages,
            located.eps_pages
        );
        Ok(located)
    }

    fn extract_metrics(&self, source: &Path, focus_pages: &[u32]) -> Result<YearsResponse> {
        let prompt = with_focus_pages(SYSTEM_PROMPT_METRICS, focus_pages);
        self.call("extract metrics", source, &prompt)
    }

    fn extract_eps(&self, source: &Path, year_label: &str) -> Result<EpsResponse> {
        self.call("extract EPS", source, &for_fiscal_year(SYSTEM_PROMPT_EPS, year_label))
    }

    fn extract_networth(&self, source: &Path, year_label: &str) -> Result<SingleMetricResponse> {
        self.call(
            "extract net worth",
            source,
            &for_fiscal_year(SYSTEM_PROMPT_NETWORTH, year_label),
        )
    }

    fn extract_pat_attributable(&self, source: &Path, year_label: &str) -> Result<SingleMetricResponse> {
        self.call(
            "extract PAT attributable",
            source,
            &for_fiscal_year(SYSTEM_PROMPT_PAT_ATTRIBUTABLE, year_label),
        )
    }
}
