//! Integration tests for the processing pipeline.
//!
//! Stub OCR extractors stand in for the vision and tesseract backends so the
//! orchestration rules can be checked without network access or native
//! libraries. The live backends are covered at the bottom of this file behind
//! `E2E_ENABLED`.
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture

use async_trait::async_trait;
use edgequake_docproc::{
    ClassifierChain, ComponentError, ContentKind, Document, DocumentStatus, FailureStage,
    FieldKind, FieldMap, FieldRetriever, FieldValue, JsonLinesSink, KeywordClassifier,
    OcrError, OcrExtractor, PatternFieldRetriever, PersistedDocument, PipelineConfig,
    ProcessRun, RetrievalRule, RuleParams, RuleSet, RunProgressCallback, RunStatus, Stage,
    ValidatorKind,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// ── Stub components ──────────────────────────────────────────────────────────

/// Returns the loaded bytes as text, like an OCR pass over a text file.
struct EchoOcr;

#[async_trait]
impl OcrExtractor for EchoOcr {
    fn name(&self) -> &str {
        "echo"
    }

    async fn extract_text(&self, doc: &Document) -> Result<String, OcrError> {
        let content = doc
            .content()
            .ok_or_else(|| OcrError::MissingFile(doc.source_locator().to_string()))?;
        Ok(String::from_utf8_lossy(&content.bytes).into_owned())
    }
}

/// Returns the same text for every document.
struct FixedOcr(&'static str);

#[async_trait]
impl OcrExtractor for FixedOcr {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn extract_text(&self, _doc: &Document) -> Result<String, OcrError> {
        Ok(self.0.to_string())
    }
}

/// Records the content kind each document reaches OCR with.
#[derive(Default)]
struct KindRecordingOcr {
    seen: Mutex<Vec<ContentKind>>,
}

#[async_trait]
impl OcrExtractor for KindRecordingOcr {
    fn name(&self) -> &str {
        "kind-recording"
    }

    async fn extract_text(&self, doc: &Document) -> Result<String, OcrError> {
        let content = doc
            .content()
            .ok_or_else(|| OcrError::MissingFile(doc.source_locator().to_string()))?;
        self.seen.lock().unwrap().push(content.kind);
        Ok(INVOICE_TEXT.to_string())
    }
}

/// Echoes content after a delay that shrinks with the trailing number in the
/// text, so later documents finish first under concurrency.
struct SlowEchoOcr {
    calls: AtomicUsize,
}

#[async_trait]
impl OcrExtractor for SlowEchoOcr {
    fn name(&self) -> &str {
        "slow-echo"
    }

    async fn extract_text(&self, doc: &Document) -> Result<String, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = EchoOcr.extract_text(doc).await?;
        let n: u64 = text
            .trim()
            .rsplit(' ')
            .next()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(60u64.saturating_sub(n * 10))).await;
        Ok(text)
    }
}

struct FailingOcr;

#[async_trait]
impl OcrExtractor for FailingOcr {
    fn name(&self) -> &str {
        "failing"
    }

    async fn extract_text(&self, _doc: &Document) -> Result<String, OcrError> {
        Err(OcrError::Service("service unavailable".into()))
    }
}

struct FixedClassifier(&'static str);

impl edgequake_docproc::Classifier for FixedClassifier {
    fn classify(&self, _doc: &Document) -> Result<String, ComponentError> {
        Ok(self.0.to_string())
    }
}

struct PanickingRetriever;

impl FieldRetriever for PanickingRetriever {
    fn retrieve_fields(&self, _doc: &Document) -> Result<FieldMap, ComponentError> {
        panic!("retriever blew up")
    }
}

struct ErroringRetriever;

impl FieldRetriever for ErroringRetriever {
    fn retrieve_fields(&self, _doc: &Document) -> Result<FieldMap, ComponentError> {
        Err(ComponentError::new("ledger lookup", "backing store unavailable"))
    }
}

/// Records every callback so event order can be asserted.
#[derive(Default)]
struct RecordingCallback {
    events: Mutex<Vec<String>>,
}

impl RunProgressCallback for RecordingCallback {
    fn on_run_start(&self, _run_id: &str, total: usize) {
        self.events.lock().unwrap().push(format!("start:{total}"));
    }

    fn on_document_complete(&self, _index: usize, _total: usize, _doc_id: &str, status: &str) {
        self.events.lock().unwrap().push(format!("complete:{status}"));
    }

    fn on_document_failed(&self, _index: usize, _total: usize, _doc_id: &str, _error: &str) {
        self.events.lock().unwrap().push("failed".to_string());
    }

    fn on_run_complete(&self, _run_id: &str, overall_status: &str, processed: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("end:{overall_status}:{processed}"));
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

const INVOICE_TEXT: &str = "ACME Corp\nINVOICE\nInvoice No: INV-001\nTotal: $200\n";

fn write_file(dir: &Path, name: &str, body: &[u8]) -> String {
    let path: PathBuf = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path.to_string_lossy().into_owned()
}

fn invoice_retriever() -> Arc<PatternFieldRetriever> {
    Arc::new(
        PatternFieldRetriever::new([
            RetrievalRule::new("invoice_number", r"Invoice No[:\s]+([A-Z0-9-]+)", FieldKind::Text),
            RetrievalRule::new("total_amount", r"Total[:\s]+\$?([\d,]+\.?\d*)", FieldKind::Number),
        ])
        .unwrap(),
    )
}

fn invoice_classifier() -> Arc<KeywordClassifier> {
    Arc::new(
        KeywordClassifier::new()
            .with_rule("invoice", ["invoice"])
            .with_rule("receipt", ["receipt"]),
    )
}

fn invoice_run() -> ProcessRun {
    let mut run = ProcessRun::new(PipelineConfig::default());
    run.set_ocr_extractor(Arc::new(EchoOcr))
        .set_classifier(invoice_classifier())
        .register_retriever("invoice", invoice_retriever())
        .register_validator(
            "invoice_number",
            Arc::new(ValidatorKind::Length),
            RuleParams::new().with("min_length", 3).with("max_length", 20),
        )
        .register_validator(
            "invoice_number",
            Arc::new(ValidatorKind::Regex),
            RuleParams::new().with("pattern", "^[A-Z0-9-]+$"),
        );
    run
}

// ── Stage sequence ───────────────────────────────────────────────────────────

#[tokio::test]
async fn invoice_flows_to_done() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "invoice.txt", INVOICE_TEXT.as_bytes());

    let mut run = invoice_run();
    let id = run.enqueue(&path);
    let done = run.run().await;

    let doc = done.document(&id).unwrap();
    assert_eq!(doc.status(), DocumentStatus::Done);
    assert_eq!(doc.classified_type(), Some("invoice"));
    assert_eq!(
        doc.extracted_fields().get("invoice_number"),
        Some(&FieldValue::Text("INV-001".into()))
    );
    assert_eq!(
        doc.extracted_fields().get("total_amount"),
        Some(&FieldValue::Number(200.0))
    );
    assert!(doc.errors().is_empty());
    assert!(doc.content().is_none(), "content is released after OCR");
    assert_eq!(done.overall_status(), RunStatus::Completed);
    assert_eq!(done.processed_count(), 1);
}

#[tokio::test]
async fn empty_ocr_text_fails_at_ocr() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "blank.txt", b"placeholder");

    let mut run = invoice_run();
    run.set_ocr_extractor(Arc::new(FixedOcr("   \n")));
    let id = run.enqueue(&path);
    let done = run.run().await;

    let doc = done.document(&id).unwrap();
    assert_eq!(doc.status().to_string(), "failed:ocr");
    assert!(doc.extracted_fields().is_empty());
    assert!(doc.classified_type().is_none());
    assert_eq!(doc.errors().len(), 1);
    assert_eq!(doc.errors()[0].stage, Stage::Ocr);
    assert_eq!(done.overall_status(), RunStatus::CompletedWithErrors);
}

#[tokio::test]
async fn ocr_service_error_fails_at_ocr() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "a.txt", INVOICE_TEXT.as_bytes());

    let mut run = invoice_run();
    run.set_ocr_extractor(Arc::new(FailingOcr));
    let id = run.enqueue(&path);
    let done = run.run().await;

    let doc = done.document(&id).unwrap();
    assert_eq!(doc.status(), DocumentStatus::Failed(FailureStage::Ocr));
    assert!(doc.errors()[0].message.contains("service unavailable"));
    assert_eq!(doc.raw_text(), "");
}

#[tokio::test]
async fn unmatched_type_without_default_fails_no_retriever() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "r.txt", b"Store RECEIPT\nTotal: 12.50");

    let mut run = invoice_run();
    let id = run.enqueue(&path);
    let done = run.run().await;

    let doc = done.document(&id).unwrap();
    assert_eq!(doc.status().to_string(), "failed:no_retriever");
    assert_eq!(doc.classified_type(), Some("receipt"));
    assert_eq!(doc.errors()[0].stage, Stage::Retrieval);
    assert!(doc.errors()[0].message.contains("'receipt'"));
}

#[tokio::test]
async fn unknown_type_uses_default_retriever() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "memo.txt", b"Internal memo\nRef: M-77");

    let mut run = invoice_run();
    run.register_default_retriever(Arc::new(
        PatternFieldRetriever::new([RetrievalRule::new("reference", r"Ref: (\S+)", FieldKind::Text)]).unwrap(),
    ));
    let id = run.enqueue(&path);
    let done = run.run().await;

    let doc = done.document(&id).unwrap();
    assert_eq!(doc.classified_type(), Some("unknown"));
    assert_eq!(doc.status(), DocumentStatus::Done);
    assert_eq!(
        doc.extracted_fields().get("reference").and_then(FieldValue::as_text),
        Some("M-77")
    );
}

#[tokio::test]
async fn impossible_date_gives_validation_errors() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "report.txt", b"Quarterly report\nDate: 2023-13-45");

    let mut run = ProcessRun::new(PipelineConfig::default());
    run.set_ocr_extractor(Arc::new(EchoOcr))
        .set_classifier(Arc::new(KeywordClassifier::new().with_rule("report", ["report"])))
        .register_retriever(
            "report",
            Arc::new(
                PatternFieldRetriever::new([RetrievalRule::new("report_date", r"Date: (\S+)", FieldKind::Text)])
                    .unwrap(),
            ),
        )
        .register_validator(
            "report_date",
            Arc::new(ValidatorKind::DateFormat),
            RuleParams::new().with("format", "YYYY-MM-DD"),
        );
    let id = run.enqueue(&path);
    let done = run.run().await;

    let doc = done.document(&id).unwrap();
    assert_eq!(doc.status().to_string(), "done_with_validation_errors");
    assert!(!doc.errors().is_empty());
    assert!(doc.errors()[0].message.contains("invalid month or day"));
    assert_eq!(doc.errors()[0].stage, Stage::Validation);
    // Validation errors do not fail the run.
    assert_eq!(done.overall_status(), RunStatus::Completed);
}

#[tokio::test]
async fn missing_components_abort_the_run() {
    let mut run = ProcessRun::new(PipelineConfig::default());
    run.enqueue("/tmp/one.pdf");
    run.enqueue("/tmp/two.pdf");
    let done = run.run().await;

    assert_eq!(done.processed_count(), 0);
    assert_eq!(done.overall_status().to_string(), "aborted");
    assert_eq!(done.run_errors().len(), 1);
    assert!(done.run_errors()[0].contains("ocr_extractor, classifier"));
    assert!(done
        .documents()
        .iter()
        .all(|d| d.status() == DocumentStatus::Queued));
    assert!(done.persisted_documents().is_empty());
}

// ── Partial failure ──────────────────────────────────────────────────────────

#[tokio::test]
async fn validation_is_exhaustive() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "inv.txt", b"Invoice No: AB\n");

    let mut run = invoice_run();
    run.register_validator(
        "invoice_number",
        Arc::new(ValidatorKind::AllowedValues),
        RuleParams::new().with("allowed_values", serde_json::json!(["INV-001", "INV-002"])),
    )
    .require_field("total_amount");
    let id = run.enqueue(&path);
    let done = run.run().await;

    let doc = done.document(&id).unwrap();
    assert_eq!(doc.status(), DocumentStatus::DoneWithValidationErrors);
    let messages: Vec<&str> = doc.errors().iter().map(|e| e.message.as_str()).collect();
    // Two failing validators on one field plus a missing required field,
    // all reported together.
    assert_eq!(messages.len(), 3, "{messages:?}");
    assert_eq!(
        messages[0],
        "Field 'invoice_number': Data 'AB' is shorter than minimum length 3."
    );
    assert!(messages[1].starts_with("Field 'invoice_number': Data 'AB' is not in the list"));
    assert_eq!(messages[2], "Field 'total_amount': required field is missing");
}

#[tokio::test]
async fn missing_file_fails_content_load_only() {
    let dir = TempDir::new().unwrap();
    let good = write_file(dir.path(), "good.txt", INVOICE_TEXT.as_bytes());
    let missing = dir.path().join("missing.pdf");

    let mut run = invoice_run();
    let bad_id = run.enqueue(missing.to_str().unwrap());
    let good_id = run.enqueue(&good);
    let done = run.run().await;

    let bad = done.document(&bad_id).unwrap();
    assert_eq!(bad.status(), DocumentStatus::Failed(FailureStage::ContentLoad));
    assert_eq!(bad.errors()[0].stage, Stage::ContentLoad);
    assert_eq!(done.document(&good_id).unwrap().status(), DocumentStatus::Done);
    assert_eq!(done.overall_status(), RunStatus::CompletedWithErrors);
    assert_eq!(done.process_summary().failed_count(), 1);
}

#[tokio::test]
async fn garbled_number_is_omitted_not_fatal() {
    let dir = TempDir::new().unwrap();
    let path = write_file(
        dir.path(),
        "inv.txt",
        b"INVOICE\nInvoice No: INV-001\nTotal: ,, see page 2\n",
    );

    let mut run = invoice_run();
    let id = run.enqueue(&path);
    let done = run.run().await;

    let doc = done.document(&id).unwrap();
    assert_eq!(doc.status(), DocumentStatus::Done);
    assert_eq!(doc.extracted_fields()["invoice_number"], FieldValue::from("INV-001"));
    assert!(!doc.extracted_fields().contains_key("total_amount"));
    assert!(doc.errors().is_empty());
}

#[tokio::test]
async fn garbled_required_number_is_reported_missing() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "inv.txt", b"Invoice No: INV-9\nTotal: lots");

    let mut run = invoice_run();
    run.register_retriever(
        "invoice",
        Arc::new(
            PatternFieldRetriever::new([
                RetrievalRule::new("invoice_number", r"Invoice No: (\S+)", FieldKind::Text),
                RetrievalRule::new("total_amount", r"Total: (\w+)", FieldKind::Number),
            ])
            .unwrap(),
        ),
    )
    .require_field("total_amount");
    let id = run.enqueue(&path);
    let done = run.run().await;

    let doc = done.document(&id).unwrap();
    assert_eq!(doc.status(), DocumentStatus::DoneWithValidationErrors);
    assert_eq!(doc.extracted_fields().len(), 1);
    assert_eq!(doc.errors().len(), 1);
    assert_eq!(doc.errors()[0].stage, Stage::Validation);
    assert_eq!(doc.errors()[0].message, "Field 'total_amount': required field is missing");
}

#[tokio::test]
async fn retriever_error_is_extraction_exception() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "inv.txt", INVOICE_TEXT.as_bytes());

    let mut run = invoice_run();
    run.register_retriever("invoice", Arc::new(ErroringRetriever));
    let id = run.enqueue(&path);
    let done = run.run().await;

    let doc = done.document(&id).unwrap();
    assert_eq!(doc.status().to_string(), "failed:extraction_exception");
    assert_eq!(doc.classified_type(), Some("invoice"));
    assert!(doc.extracted_fields().is_empty());
    assert_eq!(doc.errors()[0].stage, Stage::Retrieval);
    assert!(doc.errors()[0].message.contains("backing store unavailable"));
}

#[tokio::test]
async fn retriever_panic_is_processing_exception() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "inv.txt", INVOICE_TEXT.as_bytes());
    let other = write_file(dir.path(), "other.txt", INVOICE_TEXT.as_bytes());

    let mut run = invoice_run();
    run.register_retriever("invoice", Arc::new(PanickingRetriever));
    let first = run.enqueue(&path);
    let second = run.enqueue(&other);
    let done = run.run().await;

    for id in [&first, &second] {
        let doc = done.document(id).unwrap();
        assert_eq!(doc.status(), DocumentStatus::Failed(FailureStage::ProcessingException));
        assert!(doc.errors()[0].message.contains("retriever blew up"));
    }
    assert_eq!(done.processed_count(), 2);
}

// ── Classification ───────────────────────────────────────────────────────────

#[tokio::test]
async fn first_matching_rule_wins() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "both.txt", b"This receipt is also an invoice");

    let mut run = invoice_run();
    run.register_default_retriever(invoice_retriever());
    let id = run.enqueue(&path);
    let done = run.run().await;

    assert_eq!(done.document(&id).unwrap().classified_type(), Some("invoice"));
}

#[tokio::test]
async fn classifier_chain_falls_through_unknown() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "x.txt", b"nothing matches here");

    let chain = ClassifierChain::new()
        .then(invoice_classifier())
        .then(Arc::new(FixedClassifier("letter")));
    let mut run = invoice_run();
    run.set_classifier(Arc::new(chain))
        .register_retriever("letter", invoice_retriever());
    let id = run.enqueue(&path);
    let done = run.run().await;

    let doc = done.document(&id).unwrap();
    assert_eq!(doc.classified_type(), Some("letter"));
    // The invoice patterns find nothing, which is not an error.
    assert!(doc.extracted_fields().is_empty());
    assert_eq!(doc.status(), DocumentStatus::Done);
}

// ── Concurrency ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_run_keeps_enqueue_order() {
    let dir = TempDir::new().unwrap();
    let config = PipelineConfig::builder().concurrency(3).build().unwrap();
    let ocr = Arc::new(SlowEchoOcr {
        calls: AtomicUsize::new(0),
    });

    let mut run = ProcessRun::new(config);
    run.set_ocr_extractor(ocr.clone())
        .set_classifier(invoice_classifier())
        .register_default_retriever(invoice_retriever());

    let mut ids = Vec::new();
    for n in 0..6 {
        let path = write_file(dir.path(), &format!("doc{n}.txt"), format!("memo {n}").as_bytes());
        ids.push(run.enqueue_with_id(&path, format!("doc-{n}")));
    }
    let done = run.run().await;

    let order: Vec<_> = done.documents().iter().map(|d| d.id().clone()).collect();
    assert_eq!(order, ids);
    assert_eq!(ocr.calls.load(Ordering::SeqCst), 6);
    let summary = done.process_summary();
    assert_eq!(summary.documents[0].id, "doc-0");
    assert_eq!(summary.documents[5].raw_text_snippet, "memo 5");
}

// ── Resolver ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_suffix_falls_back_with_warning() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "scan.xyz", b"%PDF-1.4\n%fake body");

    let mut run = invoice_run();
    run.set_ocr_extractor(Arc::new(FixedOcr(INVOICE_TEXT)));
    let id = run.enqueue(&path);
    let done = run.run().await;

    let doc = done.document(&id).unwrap();
    assert_eq!(doc.content_kind(), ContentKind::Pdf);
    assert_eq!(doc.warnings().len(), 1);
    assert_eq!(doc.warnings()[0].stage, Stage::Resolve);
    assert_eq!(doc.status(), DocumentStatus::Done);
}

#[tokio::test]
async fn extensionless_png_reaches_ocr_as_image() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "scan", b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01");

    let ocr = Arc::new(KindRecordingOcr::default());
    let mut run = invoice_run();
    run.set_ocr_extractor(ocr.clone());
    let id = run.enqueue(&path);
    let done = run.run().await;

    let doc = done.document(&id).unwrap();
    assert_eq!(*ocr.seen.lock().unwrap(), vec![ContentKind::Image]);
    assert_eq!(doc.content_kind(), ContentKind::Image);
    assert_eq!(doc.warnings()[0].stage, Stage::Resolve);
    assert_eq!(doc.status(), DocumentStatus::Done);
}

#[tokio::test]
async fn unrecognisable_fallback_bytes_still_reach_ocr() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "blob.dat", &[0x00, 0xff, 0xfe, 0x81, 0x00]);

    let ocr = Arc::new(KindRecordingOcr::default());
    let mut run = invoice_run();
    run.set_ocr_extractor(ocr.clone());
    let id = run.enqueue(&path);
    let done = run.run().await;

    let doc = done.document(&id).unwrap();
    assert_eq!(*ocr.seen.lock().unwrap(), vec![ContentKind::Pdf]);
    assert_ne!(doc.status(), DocumentStatus::Failed(FailureStage::ContentLoad));
}

#[tokio::test]
async fn pdf_suffix_with_text_body_fails_content_load() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "fake.pdf", b"not really a pdf");

    let mut run = invoice_run();
    let id = run.enqueue(&path);
    let done = run.run().await;

    let doc = done.document(&id).unwrap();
    assert_eq!(doc.status(), DocumentStatus::Failed(FailureStage::ContentLoad));
    assert!(doc.raw_text().is_empty());
}

#[tokio::test]
async fn media_type_overrides_suffix() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "upload.bin", INVOICE_TEXT.as_bytes());

    let mut run = invoice_run();
    let id = run.enqueue_with_media_type(&path, "text/plain; charset=utf-8");
    let done = run.run().await;

    let doc = done.document(&id).unwrap();
    assert_eq!(doc.content_kind(), ContentKind::Text);
    assert!(doc.warnings().is_empty());
    assert_eq!(doc.status(), DocumentStatus::Done);
}

// ── Rules, summary and persistence ───────────────────────────────────────────

const RULES: &str = r#"{
    "classification": [
        { "type": "invoice", "keywords": ["invoice"] },
        { "type": "receipt", "keywords": ["receipt"] }
    ],
    "retrievers": {
        "invoice": [
            { "field": "invoice_number", "pattern": "Invoice No[:\\s]+([A-Z0-9-]+)" },
            { "field": "total_amount", "pattern": "Total[:\\s]+\\$?([\\d,]+\\.?\\d*)", "kind": "number" }
        ]
    },
    "validators": {
        "total_amount": [
            { "kind": "numeric_range", "params": { "min": 0, "max": 100 } }
        ]
    },
    "required_fields": ["invoice_number"]
}"#;

#[tokio::test]
async fn rule_file_drives_a_run_and_persists() {
    let dir = TempDir::new().unwrap();
    let invoice = write_file(dir.path(), "inv.txt", INVOICE_TEXT.as_bytes());
    let receipt = write_file(dir.path(), "rec.txt", b"RECEIPT\nTotal: 3.00");

    let callback = Arc::new(RecordingCallback::default());
    let config = PipelineConfig::builder()
        .progress_callback(callback.clone())
        .snippet_len(9)
        .build()
        .unwrap();
    let mut run = ProcessRun::new(config);
    run.set_ocr_extractor(Arc::new(EchoOcr));
    RuleSet::from_json_str(RULES).unwrap().apply(&mut run).unwrap();
    run.enqueue(&invoice);
    run.enqueue(&receipt);
    let done = run.run().await;

    let summary = done.process_summary();
    assert_eq!(summary.run_id, done.id());
    assert_eq!(summary.queued_count, 2);
    assert_eq!(summary.documents[0].status, DocumentStatus::DoneWithValidationErrors);
    assert_eq!(summary.documents[0].raw_text_snippet, "ACME Corp");
    assert_eq!(
        summary.documents[1].status,
        DocumentStatus::Failed(FailureStage::NoRetriever)
    );
    assert_eq!(summary.overall_status, RunStatus::CompletedWithErrors);
    assert!(summary.finished_at >= summary.started_at);

    let events = callback.events.lock().unwrap().clone();
    assert_eq!(
        events,
        [
            "start:2",
            "complete:done_with_validation_errors",
            "failed",
            "end:completed_with_errors:2"
        ]
    );

    let out = dir.path().join("records.jsonl");
    let sink = JsonLinesSink::new(&out);
    assert_eq!(done.persist(&sink).await.unwrap(), 2);
    let body = std::fs::read_to_string(&out).unwrap();
    let records: Vec<PersistedDocument> = body
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].run_id, done.id());
    assert_eq!(records[0].raw_text, INVOICE_TEXT);
    assert_eq!(records[1].status.to_string(), "failed:no_retriever");
}

#[test]
fn run_sync_drives_a_batch() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "inv.txt", INVOICE_TEXT.as_bytes());
    let mut run = invoice_run();
    let id = run.enqueue(&path);
    let done = run.run_sync().unwrap();
    assert_eq!(done.document(&id).unwrap().status(), DocumentStatus::Done);
}

// ── Live backends (E2E_ENABLED) ──────────────────────────────────────────────

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Skip unless E2E_ENABLED is set and the sample at `path` exists.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP: sample not found: {}", p.display());
            return;
        }
        p
    }};
}

#[tokio::test]
async fn e2e_vision_ocr_on_sample_invoice() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("invoice.pdf"));
    init_tracing();
    let config = PipelineConfig::builder().max_retries(1).build().unwrap();
    let ocr = edgequake_docproc::VisionOcrExtractor::from_config(&config).unwrap();

    let mut run = ProcessRun::new(config);
    run.set_ocr_extractor(Arc::new(ocr));
    RuleSet::from_json_str(RULES).unwrap().apply(&mut run).unwrap();
    let id = run.enqueue(path.to_str().unwrap());
    let done = run.run().await;

    let doc = done.document(&id).unwrap();
    println!("{}", done.process_summary().to_json_pretty().unwrap());
    assert!(!doc.raw_text().trim().is_empty());
    assert_eq!(doc.classified_type(), Some("invoice"));
}

#[tokio::test]
async fn e2e_tesseract_on_sample_image() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("receipt.png"));
    init_tracing();
    let config = PipelineConfig::default();
    let ocr = edgequake_docproc::TesseractOcrExtractor::new(&config);
    if !ocr.is_available().await {
        println!("SKIP: tesseract not installed");
        return;
    }

    let mut run = ProcessRun::new(config);
    run.set_ocr_extractor(Arc::new(ocr))
        .set_classifier(invoice_classifier())
        .register_default_retriever(invoice_retriever());
    let id = run.enqueue(path.to_str().unwrap());
    let done = run.run().await;

    let doc = done.document(&id).unwrap();
    assert!(!doc.raw_text().trim().is_empty(), "{:?}", doc.errors());
}
