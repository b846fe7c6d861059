//! Stage coordination over the shared document record.
//!
//! Each stage is guarded by the record's status: it runs only when the record
//! sits at the stage's expected predecessor, claims it with a conditional
//! update, does its work and writes the result with another conditional
//! update. A stage invoked out of turn is a no-op. Failures after the claim
//! are terminal for the document and recorded as its `error_message`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::blob::BlobStore;
use crate::config::PipelineConfig;
use crate::document::{DocumentId, DocumentRecord, PipelineMetadata, RecordUpdate, Status, TextPayload};
use crate::extract::{extract, title_from_url};
use crate::fetch::{Fetcher, Renderer, acquire};
use crate::guard::HostResolver;
use crate::layout::{arrange, detect_category};
use crate::prompt::{PromptInput, build_prompt};
use crate::response::parse_response;
use crate::store::DocumentStore;
use crate::synthesis::{Generator, SynthesisClient};
use crate::validate::Validator;
use crate::{DocifyError, Result, SynthesisFailure};

/// Handles to everything the stages talk to. Built once, shared by all
/// documents.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn DocumentStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub fetcher: Arc<dyn Fetcher>,
    pub renderer: Option<Arc<dyn Renderer>>,
    pub resolver: Arc<dyn HostResolver>,
    pub generator: Arc<dyn Generator>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeRequest {
    pub document_id: DocumentId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateRequest {
    pub document_id: DocumentId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub document_id: DocumentId,
    /// Overrides the instructions stored on the record.
    pub instructions: Option<String>,
}

/// Message asking for the next stage to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageTrigger {
    Scrape(ScrapeRequest),
    Validate(ValidateRequest),
    Analyze(AnalyzeRequest),
}

impl StageTrigger {
    pub fn document_id(&self) -> &DocumentId {
        match self {
            Self::Scrape(r) => &r.document_id,
            Self::Validate(r) => &r.document_id,
            Self::Analyze(r) => &r.document_id,
        }
    }
}

/// Result of invoking a stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// The stage did its work; `next` is the stage to run after it.
    Advanced { status: Status, next: Option<StageTrigger> },
    /// The record was not at the expected status; nothing was changed.
    Skipped { expected: Status, found: Status },
    /// The document reached a terminal failure status.
    Halted { status: Status, error: String },
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Scrape,
    Validate,
    Analyze,
}

impl Stage {
    /// Expected predecessor status and the in-progress status claimed.
    fn statuses(self) -> (Status, Status) {
        match self {
            Self::Scrape => (Status::Pending, Status::Scraping),
            Self::Validate => (Status::Scraped, Status::Validating),
            Self::Analyze => (Status::Validated, Status::Analyzing),
        }
    }
}

/// Work produced by a stage before it is committed.
struct StageOutput {
    update: RecordUpdate,
    next: Option<StageTrigger>,
}

/// The pipeline coordinator.
#[derive(Clone)]
pub struct Pipeline {
    services: Services,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(services: Services, config: PipelineConfig) -> Self {
        Self { services, config }
    }

    /// Create a `pending` record for `url`.
    ///
    /// # Errors
    ///
    /// `InvalidUrl` when `url` does not parse as an absolute URL.
    pub async fn submit(&self, url: &str, instructions: Option<String>) -> Result<DocumentId> {
        let parsed = Url::parse(url.trim()).map_err(|e| DocifyError::InvalidUrl(format!("{}: {}", url, e)))?;
        let instructions = instructions.filter(|s| !s.trim().is_empty());
        let record = DocumentRecord::new(parsed.as_str(), instructions);
        let id = record.id.clone();

        self.services.store.create(record).await?;
        info!(document_id = %id, url = %parsed, "document submitted");
        Ok(id)
    }

    /// Fetch and extract the document's content: `pending → scraped`.
    #[instrument(skip_all, fields(document_id = %request.document_id, stage = "scrape"))]
    pub async fn scrape(&self, request: ScrapeRequest) -> Result<StageOutcome> {
        self.run_stage(&request.document_id, Stage::Scrape, None).await
    }

    /// Score the extracted text and apply the gate: `scraped → validated`.
    #[instrument(skip_all, fields(document_id = %request.document_id, stage = "validate"))]
    pub async fn validate(&self, request: ValidateRequest) -> Result<StageOutcome> {
        self.run_stage(&request.document_id, Stage::Validate, None).await
    }

    /// Synthesize and lay out the analysis: `validated → completed`.
    #[instrument(skip_all, fields(document_id = %request.document_id, stage = "analyze"))]
    pub async fn analyze(&self, request: AnalyzeRequest) -> Result<StageOutcome> {
        self.run_stage(&request.document_id, Stage::Analyze, request.instructions).await
    }

    /// Run one stage from a trigger.
    pub async fn dispatch(&self, trigger: StageTrigger) -> Result<StageOutcome> {
        match trigger {
            StageTrigger::Scrape(request) => self.scrape(request).await,
            StageTrigger::Validate(request) => self.validate(request).await,
            StageTrigger::Analyze(request) => self.analyze(request).await,
        }
    }

    /// Drive a document from its current status to a terminal one, following
    /// the triggers each stage returns. Returns the final record.
    pub async fn run(&self, document_id: &DocumentId) -> Result<DocumentRecord> {
        let record = self.load(document_id).await?;
        let mut trigger = match record.status {
            Status::Pending => Some(StageTrigger::Scrape(ScrapeRequest { document_id: document_id.clone() })),
            Status::Scraped => Some(StageTrigger::Validate(ValidateRequest { document_id: document_id.clone() })),
            Status::Validated => Some(StageTrigger::Analyze(AnalyzeRequest {
                document_id: document_id.clone(),
                instructions: None,
            })),
            _ => None,
        };

        while let Some(next) = trigger.take() {
            debug!(document_id = %next.document_id(), "following stage trigger");
            if let StageOutcome::Advanced { next, .. } = self.dispatch(next).await? {
                trigger = next;
            }
        }

        self.load(document_id).await
    }

    /// The extracted text of a record, reading it from the blob store when
    /// it was handed off.
    pub async fn extracted_text(&self, record: &DocumentRecord) -> Result<Option<String>> {
        match &record.extracted_text {
            Some(payload) => self.load_payload(payload).await.map(Some),
            None => Ok(None),
        }
    }

    /// Delete the blobs a record's payloads point to and return how many
    /// were released. For callers that discard records once a run is over;
    /// the record's payload references dangle afterwards.
    pub async fn release_payloads(&self, record: &DocumentRecord) -> Result<usize> {
        let mut released = 0;
        for payload in [&record.extracted_text, &record.extracted_html].into_iter().flatten() {
            if let TextPayload::Blob { id, .. } = payload {
                self.services.blobs.delete(id).await?;
                released += 1;
            }
        }
        if released > 0 {
            debug!(document_id = %record.id, released, "released payload blobs");
        }
        Ok(released)
    }

    async fn load(&self, id: &DocumentId) -> Result<DocumentRecord> {
        self.services.store.get(id).await?.ok_or_else(|| DocifyError::DocumentNotFound(id.clone()))
    }

    async fn current_status(&self, id: &DocumentId) -> Result<Status> {
        Ok(self.load(id).await?.status)
    }

    async fn run_stage(&self, id: &DocumentId, stage: Stage, instructions: Option<String>) -> Result<StageOutcome> {
        let (expected, in_progress) = stage.statuses();

        let record = self.load(id).await?;
        if record.status != expected {
            info!(expected = %expected, found = %record.status, "stage skipped");
            return Ok(StageOutcome::Skipped { expected, found: record.status });
        }

        if !self.services.store.update_if(id, expected, RecordUpdate::status(in_progress)).await? {
            let found = self.current_status(id).await?;
            info!(expected = %expected, found = %found, "stage lost the claim");
            return Ok(StageOutcome::Skipped { expected, found });
        }
        info!(status = %in_progress, "stage started");

        let mut metadata = record.metadata.clone();
        let result = match stage {
            Stage::Scrape => self.scrape_content(&record, &mut metadata).await,
            Stage::Validate => self.validate_content(&record, &mut metadata).await,
            Stage::Analyze => self.analyze_content(&record, instructions, &mut metadata).await,
        };

        match result {
            Ok(StageOutput { update, next }) => {
                let status = update.status;
                if !self.services.store.update_if(id, in_progress, update).await? {
                    let found = self.current_status(id).await?;
                    warn!(expected = %in_progress, found = %found, "record changed during stage");
                    return Ok(StageOutcome::Skipped { expected: in_progress, found });
                }
                info!(status = %status, "stage completed");
                Ok(StageOutcome::Advanced { status, next })
            }
            Err(error) => self.halt(id, in_progress, error, metadata).await,
        }
    }

    async fn halt(
        &self, id: &DocumentId, in_progress: Status, error: DocifyError, metadata: PipelineMetadata,
    ) -> Result<StageOutcome> {
        let status = match error {
            DocifyError::ValidationFailed { .. } => Status::ValidationFailed,
            _ => Status::Failed,
        };
        let message = error.to_string();
        if error.is_pipeline_failure() {
            warn!(status = %status, error = %message, "stage failed");
        } else {
            tracing::error!(status = %status, error = %message, "stage failed on infrastructure error");
        }

        let update = RecordUpdate::failure(status, message.clone()).metadata(metadata);
        if !self.services.store.update_if(id, in_progress, update).await? {
            let found = self.current_status(id).await?;
            return Ok(StageOutcome::Skipped { expected: in_progress, found });
        }
        Ok(StageOutcome::Halted { status, error: message })
    }

    async fn scrape_content(&self, record: &DocumentRecord, metadata: &mut PipelineMetadata) -> Result<StageOutput> {
        let url = Url::parse(&record.url).map_err(|e| DocifyError::InvalidUrl(format!("{}: {}", record.url, e)))?;

        let acquired = match acquire(
            &url,
            &*self.services.fetcher,
            self.services.renderer.as_deref(),
            &*self.services.resolver,
            &self.config.fetch,
        )
        .await
        {
            Ok(acquired) => acquired,
            Err(DocifyError::AcquisitionFailed { kind, detail, attempts }) => {
                metadata.fetch_attempts = attempts.clone();
                return Err(DocifyError::AcquisitionFailed { kind, detail, attempts });
            }
            Err(e) => return Err(e),
        };

        metadata.fetch_method = Some(acquired.method.clone());
        metadata.fetch_attempts = acquired.attempts;

        let response = acquired.response;
        let content = extract(&response.body, response.content_type.as_deref(), &url, &self.config.extract)?;
        metadata.content_kind = Some(content.kind);
        metadata.page_count = content.page_count;
        info!(method = %acquired.method, kind = content.kind.as_str(), words = content.word_count, "content extracted");

        let extracted_text = self.store_payload(content.text).await?;
        let extracted_html = match content.html {
            Some(html) => Some(self.store_payload(html).await?),
            None => None,
        };

        let update = RecordUpdate {
            title: Some(content.title),
            description: content.description,
            extracted_text: Some(extracted_text),
            extracted_html,
            word_count: Some(content.word_count),
            metadata: Some(metadata.clone()),
            ..RecordUpdate::status(Status::Scraped)
        };
        let next = StageTrigger::Validate(ValidateRequest { document_id: record.id.clone() });
        Ok(StageOutput { update, next: Some(next) })
    }

    async fn validate_content(&self, record: &DocumentRecord, metadata: &mut PipelineMetadata) -> Result<StageOutput> {
        let text = self.extracted_text(record).await?.unwrap_or_default();
        let result = Validator::new(self.config.validation.clone()).validate(&text);
        metadata.validation = Some(result.clone());

        if let Err(kind) = result.gate(self.config.gate_threshold) {
            return Err(DocifyError::ValidationFailed { kind, confidence: result.confidence, issues: result.issues });
        }

        let update = RecordUpdate::status(Status::Validated).metadata(metadata.clone());
        let next = StageTrigger::Analyze(AnalyzeRequest {
            document_id: record.id.clone(),
            instructions: record.instructions.clone(),
        });
        Ok(StageOutput { update, next: Some(next) })
    }

    async fn analyze_content(
        &self, record: &DocumentRecord, instructions: Option<String>, metadata: &mut PipelineMetadata,
    ) -> Result<StageOutput> {
        let text = self.extracted_text(record).await?.unwrap_or_default();
        let instructions = instructions.or_else(|| record.instructions.clone());
        let category = detect_category(&text, instructions.as_deref());
        metadata.content_category = Some(category);

        let fallback_title;
        let title = match record.title.as_deref() {
            Some(title) => title,
            None => {
                fallback_title = Url::parse(&record.url).map(|u| title_from_url(&u)).unwrap_or_default();
                &fallback_title
            }
        };
        let prompt = build_prompt(
            &PromptInput {
                title,
                description: record.description.as_deref(),
                instructions: instructions.as_deref(),
                url: &record.url,
                text: &text,
            },
            &self.config.prompt,
        );

        let client = SynthesisClient::new(self.services.generator.clone(), self.config.synthesis.clone());
        let synthesis = client.generate(&prompt).await.inspect_err(|e| {
            if let DocifyError::SynthesisFailed { attempts, .. } = e {
                metadata.synthesis_attempts = *attempts;
            }
        })?;
        metadata.synthesis_attempts = synthesis.attempts;

        let malformed = |detail: String| DocifyError::SynthesisFailed {
            kind: SynthesisFailure::MalformedResponse,
            attempts: synthesis.attempts,
            detail,
        };
        let parsed = parse_response(&synthesis.text).map_err(|e| malformed(e.0))?;
        if parsed.blocks.is_empty() {
            return Err(malformed("response contained no valid blocks".to_string()));
        }

        let blocks = arrange(parsed.blocks, category, instructions.as_deref());
        info!(category = category.as_str(), blocks = blocks.len(), attempts = synthesis.attempts, "analysis ready");

        let update = RecordUpdate {
            analysis_summary: Some(parsed.summary),
            analysis_blocks: Some(blocks),
            metadata: Some(metadata.clone()),
            ..RecordUpdate::status(Status::Completed)
        };
        Ok(StageOutput { update, next: None })
    }

    async fn store_payload(&self, text: String) -> Result<TextPayload> {
        if text.len() <= self.config.inline_payload_limit {
            return Ok(TextPayload::Inline { text });
        }

        let len = text.len();
        let id = self.services.blobs.put(text.into_bytes()).await?;
        debug!(blob = %id, len, "payload handed off to blob store");
        Ok(TextPayload::Blob { id, len })
    }

    async fn load_payload(&self, payload: &TextPayload) -> Result<String> {
        match payload {
            TextPayload::Inline { text } => Ok(text.clone()),
            TextPayload::Blob { id, .. } => {
                let bytes = self.services.blobs.get(id).await?;
                String::from_utf8(bytes).map_err(|e| DocifyError::Blob(format!("blob {} is not UTF-8: {}", id, e)))
            }
        }
    }
}
