//! The process orchestrator: owns one batch of documents and drives each of
//! them through the fixed stage sequence.
//!
//! ## Stage sequence
//!
//! ```text
//! load content ──▶ OCR ──▶ classify ──▶ pick retriever ──▶ retrieve ──▶ validate
//!      │            │          │               │               │            │
//! failed:content  failed:ocr  failed:         failed:         failed:      done /
//!   _load                     processing_     no_retriever    extraction_  done_with_
//!                             exception                       exception    validation_errors
//! ```
//!
//! A stage failure ends that document only; the run moves on to the next
//! one. Panics raised inside any component are caught per document and
//! recorded as `failed:processing_exception`. The only run-wide failure is a
//! missing OCR extractor or classifier, checked before any document starts.
//!
//! ## Concurrency
//!
//! With `concurrency > 1` documents are driven through `buffer_unordered`.
//! Each future owns its document outright, so no locking is needed, and the
//! results are put back into enqueue order before the summary is built.

use crate::components::{Classifier, FieldRetriever, OcrExtractor, RuleParams, Validator};
use crate::config::PipelineConfig;
use crate::document::{Document, DocumentId, UNKNOWN_TYPE};
use crate::error::{DocProcError, OcrError};
use crate::progress::RunProgressCallback;
use crate::registry::{RetrieverRegistry, ValidatorRegistry};
use crate::resolver::{load_content, DocumentResolver};
use crate::sink::ResultSink;
use crate::status::{DocumentStatus, FailureStage, RunStatus, Stage};
use crate::summary::{DocumentSummary, PersistedDocument, ProcessSummary};
use chrono::{DateTime, Utc};
use futures::{stream, FutureExt, StreamExt};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A configured, not-yet-executed batch.
///
/// Register components and rules, enqueue documents, then call
/// [`run`](Self::run). `run` consumes the value, so a batch executes exactly
/// once.
pub struct ProcessRun {
    id: String,
    config: PipelineConfig,
    resolver: DocumentResolver,
    queue: Vec<Document>,
    ocr_extractor: Option<Arc<dyn OcrExtractor>>,
    classifier: Option<Arc<dyn Classifier>>,
    retrievers: RetrieverRegistry,
    validators: ValidatorRegistry,
}

impl ProcessRun {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            config,
            resolver: DocumentResolver::default(),
            queue: Vec::new(),
            ocr_extractor: None,
            classifier: None,
            retrievers: RetrieverRegistry::new(),
            validators: ValidatorRegistry::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Replace the resolver used by later `enqueue*` calls.
    pub fn set_resolver(&mut self, resolver: DocumentResolver) -> &mut Self {
        self.resolver = resolver;
        self
    }

    pub fn resolver_mut(&mut self) -> &mut DocumentResolver {
        &mut self.resolver
    }

    pub fn set_ocr_extractor(&mut self, extractor: Arc<dyn OcrExtractor>) -> &mut Self {
        self.ocr_extractor = Some(extractor);
        self
    }

    pub fn set_classifier(&mut self, classifier: Arc<dyn Classifier>) -> &mut Self {
        self.classifier = Some(classifier);
        self
    }

    /// Register a retriever for a classified type; `"default"` registers the
    /// fallback.
    pub fn register_retriever(&mut self, type_tag: &str, retriever: Arc<dyn FieldRetriever>) -> &mut Self {
        self.retrievers.register(type_tag, retriever);
        self
    }

    pub fn register_default_retriever(&mut self, retriever: Arc<dyn FieldRetriever>) -> &mut Self {
        self.retrievers.register_default(retriever);
        self
    }

    pub fn register_validator(
        &mut self,
        field: &str,
        validator: Arc<dyn Validator>,
        rules: RuleParams,
    ) -> &mut Self {
        self.validators.register(field, validator, rules);
        self
    }

    pub fn require_field(&mut self, field: &str) -> &mut Self {
        self.validators.require_field(field);
        self
    }

    /// Queue a document under a fresh identifier.
    pub fn enqueue(&mut self, locator: &str) -> DocumentId {
        self.enqueue_with_id(locator, DocumentId::generate())
    }

    /// Queue a document under a caller-chosen identifier.
    pub fn enqueue_with_id(&mut self, locator: &str, id: impl Into<DocumentId>) -> DocumentId {
        let doc = self.resolver.resolve(locator, id.into());
        self.push(doc)
    }

    /// Queue a document whose media type is known up front.
    pub fn enqueue_with_media_type(&mut self, locator: &str, media_type: &str) -> DocumentId {
        let doc = self
            .resolver
            .resolve_with_media_type(locator, DocumentId::generate(), media_type);
        self.push(doc)
    }

    fn push(&mut self, doc: Document) -> DocumentId {
        let id = doc.id().clone();
        debug!(run = %self.id, doc = %id, locator = doc.source_locator(), "Enqueued");
        self.queue.push(doc);
        id
    }

    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    /// Drive every queued document to a terminal state.
    ///
    /// Never fails: problems are recorded on the documents or, for missing
    /// components, as run errors with `overall_status == aborted`.
    pub async fn run(self) -> CompletedRun {
        let ProcessRun {
            id,
            config,
            queue,
            ocr_extractor,
            classifier,
            retrievers,
            validators,
            ..
        } = self;

        let started_at = Utc::now();
        let queued_count = queue.len();
        let callback = config.progress_callback.clone();
        if let Some(ref cb) = callback {
            cb.on_run_start(&id, queued_count);
        }
        info!(run = %id, documents = queued_count, concurrency = config.concurrency, "Run started");

        let (ocr, classifier) = match (ocr_extractor, classifier) {
            (Some(ocr), Some(classifier)) => (ocr, classifier),
            (ocr, classifier) => {
                let mut missing = Vec::new();
                if ocr.is_none() {
                    missing.push("ocr_extractor");
                }
                if classifier.is_none() {
                    missing.push("classifier");
                }
                let message = format!("required components not registered: {}", missing.join(", "));
                warn!(run = %id, "Run aborted: {}", message);
                let completed = CompletedRun {
                    id,
                    overall_status: RunStatus::Aborted,
                    run_errors: vec![message],
                    documents: queue,
                    queued_count,
                    processed_count: 0,
                    started_at,
                    finished_at: Utc::now(),
                    snippet_len: config.snippet_len,
                };
                if let Some(ref cb) = callback {
                    cb.on_run_complete(&completed.id, &completed.overall_status.to_string(), 0);
                }
                return completed;
            }
        };

        let stages = Stages {
            ocr: ocr.as_ref(),
            classifier: classifier.as_ref(),
            retrievers: &retrievers,
            validators: &validators,
            download_timeout_secs: config.download_timeout_secs,
        };

        let mut results: Vec<(usize, Document)> = stream::iter(queue.into_iter().enumerate().map(|(idx, doc)| {
            let stages = &stages;
            let callback = callback.as_deref();
            async move {
                let doc = process_document(stages, idx, queued_count, doc, callback).await;
                (idx, doc)
            }
        }))
        .buffer_unordered(config.concurrency.max(1))
        .collect()
        .await;
        results.sort_by_key(|(idx, _)| *idx);
        let documents: Vec<Document> = results.into_iter().map(|(_, doc)| doc).collect();

        let any_failed = documents.iter().any(|d| d.status().is_failed());
        let overall_status = if any_failed {
            RunStatus::CompletedWithErrors
        } else {
            RunStatus::Completed
        };
        let processed_count = documents.len();
        info!(
            run = %id,
            status = %overall_status,
            processed = processed_count,
            failed = documents.iter().filter(|d| d.status().is_failed()).count(),
            "Run finished"
        );
        if let Some(ref cb) = callback {
            cb.on_run_complete(&id, &overall_status.to_string(), processed_count);
        }

        CompletedRun {
            id,
            overall_status,
            run_errors: Vec::new(),
            documents,
            queued_count,
            processed_count,
            started_at,
            finished_at: Utc::now(),
            snippet_len: config.snippet_len,
        }
    }

    /// Blocking wrapper around [`run`](Self::run) with its own runtime.
    pub fn run_sync(self) -> Result<CompletedRun, DocProcError> {
        let runtime = tokio::runtime::Runtime::new()
            .map_err(|e| DocProcError::Internal(format!("Failed to create tokio runtime: {}", e)))?;
        Ok(runtime.block_on(self.run()))
    }
}

/// Read-only view of everything a document needs during a run.
struct Stages<'a> {
    ocr: &'a dyn OcrExtractor,
    classifier: &'a dyn Classifier,
    retrievers: &'a RetrieverRegistry,
    validators: &'a ValidatorRegistry,
    download_timeout_secs: u64,
}

async fn process_document(
    stages: &Stages<'_>,
    idx: usize,
    total: usize,
    mut doc: Document,
    callback: Option<&dyn RunProgressCallback>,
) -> Document {
    if let Some(cb) = callback {
        cb.on_document_start(idx + 1, total, doc.id().as_str());
    }

    let outcome = AssertUnwindSafe(drive(stages, &mut doc)).catch_unwind().await;
    if let Err(panic) = outcome {
        let message = format!("unexpected fault: {}", panic_message(panic.as_ref()));
        warn!(doc = %doc.id(), "{}", message);
        doc.release_content();
        doc.fail(FailureStage::ProcessingException, Stage::Processing, message);
    }

    if let Some(cb) = callback {
        match doc.status() {
            DocumentStatus::Failed(_) => {
                let last = doc.errors().last().map(|e| e.message.as_str()).unwrap_or_default();
                cb.on_document_failed(idx + 1, total, doc.id().as_str(), last);
            }
            status => cb.on_document_complete(idx + 1, total, doc.id().as_str(), &status.to_string()),
        }
    }
    doc
}

/// Run the stages in order, stopping at the first failure.
async fn drive(stages: &Stages<'_>, doc: &mut Document) {
    match load_content(doc, stages.download_timeout_secs).await {
        Ok(content) => {
            doc.set_content_kind(content.kind);
            doc.set_content(content);
            doc.advance(DocumentStatus::ContentLoaded);
        }
        Err(e) => {
            warn!(doc = %doc.id(), "Content load failed: {}", e);
            doc.fail(FailureStage::ContentLoad, Stage::ContentLoad, e.to_string());
            return;
        }
    }

    let ocr_result = stages.ocr.extract_text(doc).await;
    doc.release_content();
    match ocr_result {
        Ok(text) if !text.trim().is_empty() => {
            debug!(doc = %doc.id(), chars = text.len(), extractor = stages.ocr.name(), "OCR done");
            doc.set_raw_text(text);
            doc.advance(DocumentStatus::OcrDone);
        }
        other => {
            let err = other.err().unwrap_or(OcrError::EmptyResult);
            warn!(doc = %doc.id(), "OCR failed: {}", err);
            doc.fail(FailureStage::Ocr, Stage::Ocr, err.to_string());
            return;
        }
    }

    match stages.classifier.classify(doc) {
        Ok(tag) => {
            debug!(doc = %doc.id(), tag = %tag, "Classified");
            doc.set_classified_type(tag);
            doc.advance(DocumentStatus::Classified);
        }
        Err(e) => {
            warn!(doc = %doc.id(), "Classifier fault: {}", e);
            doc.fail(FailureStage::ProcessingException, Stage::Classification, e.to_string());
            return;
        }
    }

    let tag = doc.classified_type().unwrap_or(UNKNOWN_TYPE).to_string();
    let Some(retriever) = stages.retrievers.lookup(&tag) else {
        warn!(doc = %doc.id(), tag = %tag, "No retriever for type");
        doc.fail(
            FailureStage::NoRetriever,
            Stage::Retrieval,
            format!("no field retriever registered for type '{tag}' and no default retriever"),
        );
        return;
    };

    match retriever.retrieve_fields(doc) {
        Ok(fields) => {
            debug!(doc = %doc.id(), fields = fields.len(), "Fields retrieved");
            doc.set_extracted_fields(fields);
            doc.advance(DocumentStatus::FieldsRetrieved);
        }
        Err(e) => {
            warn!(doc = %doc.id(), "Retriever fault: {}", e);
            doc.fail(FailureStage::ExtractionException, Stage::Retrieval, e.to_string());
            return;
        }
    }

    let errors = stages.validators.validate_fields(doc.extracted_fields());
    doc.advance(DocumentStatus::Validated);
    let terminal = if errors.is_empty() {
        DocumentStatus::Done
    } else {
        DocumentStatus::DoneWithValidationErrors
    };
    debug!(doc = %doc.id(), errors = errors.len(), "Validated");
    for error in errors {
        doc.push_error(error);
    }
    doc.advance(terminal);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "component panicked".to_string()
    }
}

/// A finished batch. Read-only.
#[derive(Debug, Clone)]
pub struct CompletedRun {
    id: String,
    overall_status: RunStatus,
    run_errors: Vec<String>,
    documents: Vec<Document>,
    queued_count: usize,
    processed_count: usize,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    snippet_len: usize,
}

impl CompletedRun {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn overall_status(&self) -> RunStatus {
        self.overall_status
    }

    pub fn run_errors(&self) -> &[String] {
        &self.run_errors
    }

    /// Documents in enqueue order.
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn document(&self, id: &DocumentId) -> Option<&Document> {
        self.documents.iter().find(|d| d.id() == id)
    }

    pub fn processed_count(&self) -> usize {
        self.processed_count
    }

    pub fn process_summary(&self) -> ProcessSummary {
        ProcessSummary {
            run_id: self.id.clone(),
            overall_status: self.overall_status,
            queued_count: self.queued_count,
            processed_count: self.processed_count,
            run_errors: self.run_errors.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            documents: self
                .documents
                .iter()
                .map(|d| DocumentSummary::from_document(d, self.snippet_len))
                .collect(),
        }
    }

    /// Flattened records for every document that reached a terminal state.
    pub fn persisted_documents(&self) -> Vec<PersistedDocument> {
        self.documents
            .iter()
            .filter(|d| d.status().is_terminal())
            .map(|d| PersistedDocument::from_document(&self.id, d))
            .collect()
    }

    /// Hand every finished document to `sink`, then flush it. Returns the
    /// number of records stored.
    pub async fn persist(&self, sink: &dyn ResultSink) -> Result<usize, DocProcError> {
        let records = self.persisted_documents();
        for record in &records {
            sink.store(record).await?;
        }
        sink.flush().await?;
        Ok(records.len())
    }
}
