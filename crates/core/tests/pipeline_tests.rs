//! End-to-end pipeline tests with scripted services
use std::collections::VecDeque;
use std::io;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use docify_core::{
    AnalyzeRequest, BlockSize, ContentKind, DocifyError, DocumentId, DocumentStore, FetchError, FetchResponse, Fetcher,
    GRID_BUDGET, GenerateError, GenerationConfig, Generator, HostResolver, MAX_BLOCKS, MemoryBlobStore,
    MemoryDocumentStore, Pipeline, PipelineConfig, RecordUpdate, Renderer, ScrapeRequest, Services, StageOutcome, StageTrigger,
    Status, TextPayload, ValidateRequest, total_units,
};
use url::Url;

fn get_fixture_path(name: &str) -> String {
    format!("../../tests/fixtures/{}", name)
}

fn html_response(body: String) -> FetchResponse {
    FetchResponse { status: 200, body: body.into_bytes(), content_type: Some("text/html; charset=utf-8".into()) }
}

struct ScriptedFetcher {
    script: Mutex<VecDeque<Result<FetchResponse, FetchError>>>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    fn new(script: Vec<Result<FetchResponse, FetchError>>) -> Arc<Self> {
        Arc::new(Self { script: Mutex::new(script.into()), calls: AtomicUsize::new(0) })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, _url: &Url, _headers: &[(String, String)]) -> Result<FetchResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(FetchResponse { status: 404, body: Vec::new(), content_type: None }))
    }
}

struct FixedRenderer(String);

#[async_trait]
impl Renderer for FixedRenderer {
    fn name(&self) -> &str {
        "headless"
    }

    async fn render(&self, _url: &Url) -> Result<String, FetchError> {
        Ok(self.0.clone())
    }
}

/// Resolves every host to one address.
struct StaticResolver(IpAddr);

#[async_trait]
impl HostResolver for StaticResolver {
    async fn resolve(&self, _host: &str, _port: u16) -> io::Result<Vec<IpAddr>> {
        Ok(vec![self.0])
    }
}

struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<String, GenerateError>>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    fn new(script: Vec<Result<String, GenerateError>>) -> Arc<Self> {
        Arc::new(Self { script: Mutex::new(script.into()), calls: AtomicUsize::new(0) })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, prompt: &str, _config: &GenerationConfig) -> Result<String, GenerateError> {
        assert!(prompt.contains("CONTENT:"));
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GenerateError::InvalidRequest("script exhausted".into())))
    }
}

const FOUR_BLOCKS: &str = r#"Here is the analysis:
```json
{
  "summary": "The scheduler orders jobs by deadline and spreads them across workers.",
  "blocks": [
    {"id": "overview", "type": "summary", "size": "large", "title": "How scheduling works", "content": "Jobs wait in a deadline-ordered queue."},
    {"id": "points", "type": "key_points", "size": "medium", "title": "Key points", "content": "- Bounded queue\n- Idle workers pull jobs"},
    {"id": "submit", "type": "code", "size": "small", "title": "Submitting a job", "content": "queue.submit(job)?;", "metadata": {"language": "rust"}},
    {"id": "setup", "type": "guide", "size": "small", "title": "Setup", "content": "1. Set the queue size\n2. Start two workers"}
  ]
}
```"#;

struct Harness {
    pipeline: Pipeline,
    store: Arc<MemoryDocumentStore>,
    blobs: Arc<MemoryBlobStore>,
    fetcher: Arc<ScriptedFetcher>,
    generator: Arc<ScriptedGenerator>,
}

fn harness(
    fetches: Vec<Result<FetchResponse, FetchError>>, generations: Vec<Result<String, GenerateError>>,
    renderer: Option<Arc<dyn Renderer>>, config: PipelineConfig,
) -> Harness {
    let store = Arc::new(MemoryDocumentStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let fetcher = ScriptedFetcher::new(fetches);
    let generator = ScriptedGenerator::new(generations);
    let services = Services {
        store: store.clone(),
        blobs: blobs.clone(),
        fetcher: fetcher.clone(),
        renderer,
        resolver: Arc::new(StaticResolver("93.184.216.34".parse().unwrap())),
        generator: generator.clone(),
    };
    Harness { pipeline: Pipeline::new(services, config), store, blobs, fetcher, generator }
}

fn fast_config() -> PipelineConfig {
    PipelineConfig::builder().base_delay(Duration::from_millis(1)).build()
}

fn guide_html() -> String {
    std::fs::read_to_string(get_fixture_path("scheduler_guide.html")).unwrap()
}

#[tokio::test]
async fn test_scenario_a_html_document_completes() {
    let html = guide_html();
    assert!(html.len() >= 15_000);
    let h = harness(vec![Ok(html_response(html))], vec![Ok(FOUR_BLOCKS.to_string())], None, fast_config());

    let id = h.pipeline.submit("https://docs.example.com/scheduler/", None).await.unwrap();
    let record = h.pipeline.run(&id).await.unwrap();

    assert_eq!(record.status, Status::Completed, "error: {:?}", record.error_message);
    assert_eq!(record.title.as_deref(), Some("Getting Started with the Scheduler"));
    assert_eq!(h.fetcher.calls(), 1);
    assert_eq!(record.metadata.fetch_method.as_deref(), Some("modern-browser"));
    assert_eq!(record.metadata.content_kind, Some(ContentKind::Html));

    let validation = record.metadata.validation.as_ref().unwrap();
    assert!(validation.confidence > 0.7, "confidence {}", validation.confidence);
    assert!(validation.issues.is_empty());

    let sizes: Vec<BlockSize> = record.analysis_blocks.iter().map(|b| b.size).collect();
    assert_eq!(sizes, vec![BlockSize::Large, BlockSize::Medium, BlockSize::Small, BlockSize::Small]);
    assert_eq!(total_units(&record.analysis_blocks), 7);
    assert_eq!(record.metadata.synthesis_attempts, 1);
    assert!(record.analysis_summary.unwrap().contains("deadline"));
    assert!(record.error_message.is_none());
}

#[tokio::test]
async fn test_scenario_b_short_text_fails_validation() {
    let body = std::fs::read(get_fixture_path("short.txt")).unwrap();
    let response = FetchResponse { status: 200, body, content_type: Some("text/plain".into()) };
    let h = harness(vec![Ok(response)], vec![Ok(FOUR_BLOCKS.to_string())], None, fast_config());

    let id = h.pipeline.submit("https://docs.example.com/notes.txt", None).await.unwrap();
    let record = h.pipeline.run(&id).await.unwrap();

    assert_eq!(record.status, Status::ValidationFailed);
    assert!(record.error_message.unwrap().contains("too short"));
    assert_eq!(h.generator.calls(), 0);
    assert!(record.analysis_blocks.is_empty());
}

#[tokio::test]
async fn test_scenario_c_retries_then_completes() {
    let h = harness(
        vec![Ok(html_response(guide_html()))],
        vec![
            Err(GenerateError::Transient("HTTP 503: overloaded".into())),
            Err(GenerateError::RateLimited { retry_after: Some(Duration::from_millis(2)) }),
            Ok(FOUR_BLOCKS.to_string()),
        ],
        None,
        fast_config(),
    );

    let id = h.pipeline.submit("https://docs.example.com/scheduler/", None).await.unwrap();
    let record = h.pipeline.run(&id).await.unwrap();

    assert_eq!(record.status, Status::Completed, "error: {:?}", record.error_message);
    assert_eq!(record.metadata.synthesis_attempts, 3);
    assert_eq!(h.generator.calls(), 3);
}

#[tokio::test]
async fn test_retry_exhaustion_fails_document() {
    let h = harness(
        vec![Ok(html_response(guide_html()))],
        vec![Err(GenerateError::Timeout), Err(GenerateError::Timeout), Err(GenerateError::Timeout)],
        None,
        fast_config(),
    );

    let id = h.pipeline.submit("https://docs.example.com/scheduler/", None).await.unwrap();
    let record = h.pipeline.run(&id).await.unwrap();

    assert_eq!(record.status, Status::Failed);
    assert!(record.error_message.unwrap().contains("retryable_exhausted"));
    assert_eq!(record.metadata.synthesis_attempts, 3);
}

#[tokio::test]
async fn test_malformed_model_output_fails_document() {
    let h = harness(
        vec![Ok(html_response(guide_html()))],
        vec![Ok("I am unable to produce JSON today.".to_string())],
        None,
        fast_config(),
    );

    let id = h.pipeline.submit("https://docs.example.com/scheduler/", None).await.unwrap();
    let record = h.pipeline.run(&id).await.unwrap();

    assert_eq!(record.status, Status::Failed);
    assert!(record.error_message.unwrap().contains("malformed_response"));
    assert_eq!(h.generator.calls(), 1);
}

#[tokio::test]
async fn test_loopback_url_rejected_without_requests() {
    let h = harness(vec![Ok(html_response(guide_html()))], vec![], None, fast_config());

    let id = h.pipeline.submit("http://127.0.0.1:8080/admin", None).await.unwrap();
    let record = h.pipeline.run(&id).await.unwrap();

    assert_eq!(record.status, Status::Failed);
    assert!(record.error_message.unwrap().contains("ssrf_rejected"));
    assert_eq!(h.fetcher.calls(), 0);
    assert!(record.metadata.fetch_attempts.is_empty());
}

#[tokio::test]
async fn test_private_resolution_rejected_without_requests() {
    let store = Arc::new(MemoryDocumentStore::new());
    let fetcher = ScriptedFetcher::new(vec![Ok(html_response(guide_html()))]);
    let services = Services {
        store: store.clone(),
        blobs: Arc::new(MemoryBlobStore::new()),
        fetcher: fetcher.clone(),
        renderer: None,
        resolver: Arc::new(StaticResolver("10.0.0.8".parse().unwrap())),
        generator: ScriptedGenerator::new(vec![]),
    };
    let pipeline = Pipeline::new(services, fast_config());

    let id = pipeline.submit("https://intranet.example.com/wiki", None).await.unwrap();
    let record = pipeline.run(&id).await.unwrap();

    assert_eq!(record.status, Status::Failed);
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test]
async fn test_out_of_turn_stages_are_noops() {
    let h = harness(vec![Ok(html_response(guide_html()))], vec![Ok(FOUR_BLOCKS.to_string())], None, fast_config());
    let id = h.pipeline.submit("https://docs.example.com/scheduler/", None).await.unwrap();

    let outcome = h
        .pipeline
        .analyze(AnalyzeRequest { document_id: id.clone(), instructions: None })
        .await
        .unwrap();
    assert_eq!(outcome, StageOutcome::Skipped { expected: Status::Validated, found: Status::Pending });
    assert_eq!(h.generator.calls(), 0);

    let completed = h.pipeline.run(&id).await.unwrap();
    assert_eq!(completed.status, Status::Completed);
    let fetches = h.fetcher.calls();

    let outcome = h.pipeline.scrape(ScrapeRequest { document_id: id.clone() }).await.unwrap();
    assert_eq!(outcome, StageOutcome::Skipped { expected: Status::Pending, found: Status::Completed });
    let outcome = h.pipeline.validate(ValidateRequest { document_id: id.clone() }).await.unwrap();
    assert!(matches!(outcome, StageOutcome::Skipped { .. }));

    let after = h.store.get(&id).await.unwrap().unwrap();
    assert_eq!(after, completed);
    assert_eq!(h.fetcher.calls(), fetches);
    assert_eq!(h.generator.calls(), 1);
}

#[tokio::test]
async fn test_stages_return_triggers() {
    let h = harness(vec![Ok(html_response(guide_html()))], vec![Ok(FOUR_BLOCKS.to_string())], None, fast_config());
    let id = h.pipeline.submit("https://docs.example.com/scheduler/", Some("Focus on setup".into())).await.unwrap();

    let outcome = h.pipeline.scrape(ScrapeRequest { document_id: id.clone() }).await.unwrap();
    let StageOutcome::Advanced { status: Status::Scraped, next: Some(trigger) } = outcome else {
        panic!("unexpected outcome: {:?}", outcome);
    };
    assert_eq!(trigger, StageTrigger::Validate(ValidateRequest { document_id: id.clone() }));

    let outcome = h.pipeline.dispatch(trigger).await.unwrap();
    let StageOutcome::Advanced { status: Status::Validated, next: Some(StageTrigger::Analyze(request)) } = outcome
    else {
        panic!("unexpected outcome: {:?}", outcome);
    };
    assert_eq!(request.instructions.as_deref(), Some("Focus on setup"));

    let outcome = h.pipeline.analyze(request).await.unwrap();
    assert_eq!(outcome, StageOutcome::Advanced { status: Status::Completed, next: None });
}

#[tokio::test]
async fn test_large_payloads_go_to_blob_store() {
    let config = PipelineConfig::builder().inline_payload_limit(256).base_delay(Duration::from_millis(1)).build();
    let h = harness(vec![Ok(html_response(guide_html()))], vec![Ok(FOUR_BLOCKS.to_string())], None, config);

    let id = h.pipeline.submit("https://docs.example.com/scheduler/", None).await.unwrap();
    let record = h.pipeline.run(&id).await.unwrap();

    assert_eq!(record.status, Status::Completed);
    assert!(matches!(record.extracted_text, Some(TextPayload::Blob { .. })));
    assert!(matches!(record.extracted_html, Some(TextPayload::Blob { .. })));
    assert_eq!(h.blobs.len().await, 2);

    let text = h.pipeline.extracted_text(&record).await.unwrap().unwrap();
    assert!(text.contains("priority queue"));

    assert_eq!(h.pipeline.release_payloads(&record).await.unwrap(), 2);
    assert!(h.blobs.is_empty().await);
    assert!(h.pipeline.extracted_text(&record).await.is_err());
}

#[tokio::test]
async fn test_inline_payloads_release_nothing() {
    let h = harness(vec![Ok(html_response(guide_html()))], vec![Ok(FOUR_BLOCKS.to_string())], None, fast_config());

    let id = h.pipeline.submit("https://docs.example.com/scheduler/", None).await.unwrap();
    let record = h.pipeline.run(&id).await.unwrap();

    assert!(matches!(record.extracted_text, Some(TextPayload::Inline { .. })));
    assert_eq!(h.pipeline.release_payloads(&record).await.unwrap(), 0);
}

#[tokio::test]
async fn test_renderer_used_when_direct_payloads_are_thin() {
    let thin = "<html><body><main><p>Loading the documentation, please wait.</p></main></body></html>".to_string();
    let h = harness(
        vec![Ok(html_response(thin.clone())), Ok(html_response(thin.clone())), Ok(html_response(thin))],
        vec![Ok(FOUR_BLOCKS.to_string())],
        Some(Arc::new(FixedRenderer(guide_html()))),
        fast_config(),
    );

    let id = h.pipeline.submit("https://app.example.com/docs", None).await.unwrap();
    let record = h.pipeline.run(&id).await.unwrap();

    assert_eq!(record.status, Status::Completed, "error: {:?}", record.error_message);
    assert_eq!(record.metadata.fetch_method.as_deref(), Some("headless"));
    assert_eq!(record.metadata.fetch_attempts.len(), 4);
    assert_eq!(h.fetcher.calls(), 3);
}

#[tokio::test]
async fn test_all_strategies_failing_records_attempts() {
    let h = harness(
        vec![Err(FetchError::Request("connection reset".into())), Err(FetchError::Timeout), Err(FetchError::Timeout)],
        vec![],
        None,
        fast_config(),
    );

    let id = h.pipeline.submit("https://docs.example.com/down", None).await.unwrap();
    let record = h.pipeline.run(&id).await.unwrap();

    assert_eq!(record.status, Status::Failed);
    assert!(record.error_message.unwrap().contains("all_strategies_exhausted"));
    assert_eq!(record.metadata.fetch_attempts.len(), 3);
    assert!(record.metadata.fetch_attempts.iter().all(|a| !a.succeeded));
}

#[tokio::test]
async fn test_submit_rejects_unparseable_url() {
    let h = harness(vec![], vec![], None, fast_config());
    let result = h.pipeline.submit("not a url", None).await;
    assert!(matches!(result, Err(DocifyError::InvalidUrl(_))));
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn test_oversized_model_layout_is_packed() {
    let blocks: Vec<String> = ["summary", "key_points", "architecture", "diagram", "code", "comparison", "guide"]
        .iter()
        .map(|t| format!(r#"{{"type": "{t}", "size": "large", "title": "{t}", "content": "Details about {t}."}}"#))
        .collect();
    let response = format!(r#"{{"summary": "Everything at once.", "blocks": [{}]}}"#, blocks.join(","));
    let h = harness(vec![Ok(html_response(guide_html()))], vec![Ok(response)], None, fast_config());

    let id = h.pipeline.submit("https://docs.example.com/scheduler/", None).await.unwrap();
    let record = h.pipeline.run(&id).await.unwrap();

    assert_eq!(record.status, Status::Completed);
    assert_eq!(record.analysis_blocks.len(), MAX_BLOCKS);
    assert!(total_units(&record.analysis_blocks) <= GRID_BUDGET);
}

/// What a competing writer does to the record while synthesis is in flight.
enum Interference {
    Remove,
    Cancel,
}

/// Answers with [`FOUR_BLOCKS`] after disturbing the record it is working on.
struct InterferingGenerator {
    store: Arc<MemoryDocumentStore>,
    target: Mutex<Option<DocumentId>>,
    interference: Interference,
}

#[async_trait]
impl Generator for InterferingGenerator {
    async fn generate(&self, _prompt: &str, _config: &GenerationConfig) -> Result<String, GenerateError> {
        let id = self.target.lock().unwrap().clone().expect("target set before analysis");
        match self.interference {
            Interference::Remove => {
                self.store.remove(&id).await;
            }
            Interference::Cancel => {
                let cancel = RecordUpdate::failure(Status::Failed, "cancelled by operator");
                assert!(self.store.update_if(&id, Status::Analyzing, cancel).await.unwrap());
            }
        }
        Ok(FOUR_BLOCKS.to_string())
    }
}

async fn validated_with_interference(interference: Interference) -> (Pipeline, Arc<MemoryDocumentStore>, DocumentId) {
    let store = Arc::new(MemoryDocumentStore::new());
    let generator =
        Arc::new(InterferingGenerator { store: store.clone(), target: Mutex::new(None), interference });
    let services = Services {
        store: store.clone(),
        blobs: Arc::new(MemoryBlobStore::new()),
        fetcher: ScriptedFetcher::new(vec![Ok(html_response(guide_html()))]),
        renderer: None,
        resolver: Arc::new(StaticResolver("93.184.216.34".parse().unwrap())),
        generator: generator.clone(),
    };
    let pipeline = Pipeline::new(services, fast_config());

    let id = pipeline.submit("https://docs.example.com/scheduler/", None).await.unwrap();
    *generator.target.lock().unwrap() = Some(id.clone());
    pipeline.scrape(ScrapeRequest { document_id: id.clone() }).await.unwrap();
    pipeline.validate(ValidateRequest { document_id: id.clone() }).await.unwrap();
    assert_eq!(store.get(&id).await.unwrap().unwrap().status, Status::Validated);

    (pipeline, store, id)
}

#[tokio::test]
async fn test_record_removed_mid_stage_is_not_recreated() {
    let (pipeline, store, id) = validated_with_interference(Interference::Remove).await;

    let result = pipeline.analyze(AnalyzeRequest { document_id: id.clone(), instructions: None }).await;

    assert!(matches!(result, Err(DocifyError::DocumentNotFound(ref missing)) if *missing == id));
    assert!(store.get(&id).await.unwrap().is_none());
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_record_cancelled_mid_stage_keeps_cancellation() {
    let (pipeline, store, id) = validated_with_interference(Interference::Cancel).await;

    let outcome = pipeline.analyze(AnalyzeRequest { document_id: id.clone(), instructions: None }).await.unwrap();

    assert_eq!(outcome, StageOutcome::Skipped { expected: Status::Analyzing, found: Status::Failed });
    let record = store.get(&id).await.unwrap().unwrap();
    assert_eq!(record.status, Status::Failed);
    assert_eq!(record.error_message.as_deref(), Some("cancelled by operator"));
    assert!(record.analysis_blocks.is_empty());
    assert!(record.analysis_summary.is_none());

    let rerun = pipeline.run(&id).await.unwrap();
    assert_eq!(rerun, record);
}
