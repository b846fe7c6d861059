pub mod blob;
pub mod config;
pub mod document;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod guard;
pub mod layout;
pub mod parse;
#[cfg(feature = "pdf")]
pub mod pdf;
pub mod pipeline;
pub mod preprocess;
pub mod prompt;
pub mod response;
pub mod scoring;
pub mod store;
pub mod synthesis;
pub mod validate;
pub mod xml;

pub use blob::{BlobId, BlobStore, FileBlobStore, MemoryBlobStore};
pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use document::{
    Block, BlockSize, BlockType, DocumentId, DocumentRecord, GRID_BUDGET, MAX_BLOCKS, PipelineMetadata, RecordUpdate,
    Status, TextPayload, total_units,
};
pub use error::{AcquisitionFailure, DocifyError, Result, SynthesisFailure, ValidationFailure};
pub use extract::{ContentKind, ExtractConfig, ExtractedContent, decode_text, detect_kind, extract};
pub use fetch::{
    Acquired, FetchAttempt, FetchConfig, FetchError, FetchResponse, FetchStrategy, Fetcher, Renderer, acquire,
    default_strategies, fetch_file, fetch_stdin,
};
#[cfg(feature = "fetch")]
pub use fetch::{BrowserlessRenderer, DEFAULT_BROWSERLESS_URL, HttpFetcher};
pub use guard::{HostResolver, SystemResolver, check_url, is_forbidden_ip};
pub use layout::{ContentCategory, arrange, detect_category, pack_blocks, priority, select_blocks};
pub use parse::Document;
#[doc(hidden)]
pub use preprocess::{PreprocessConfig, preprocess_html};
pub use pipeline::{
    AnalyzeRequest, Pipeline, ScrapeRequest, Services, StageOutcome, StageTrigger, ValidateRequest,
};
pub use prompt::{PromptConfig, PromptInput, build_prompt, truncate_prioritized};
pub use response::{AnalysisResponse, MalformedResponse, find_json_object, parse_response};
#[doc(hidden)]
pub use scoring::{ScoreConfig, ScoreResult, best_candidate, calculate_score};
pub use store::{DocumentStore, MemoryDocumentStore};
pub use synthesis::{
    GenerateError, GenerationConfig, Generator, RetryConfig, Synthesis, SynthesisClient, SynthesisConfig,
};
#[cfg(feature = "fetch")]
pub use synthesis::{DEFAULT_GEMINI_MODEL, DEFAULT_GEMINI_URL, GeminiGenerator};
pub use validate::{Subscores, ValidationConfig, ValidationResult, Validator};
pub use xml::{Feed, FeedEntry, FeedFormat, XmlNode, read_feed};
