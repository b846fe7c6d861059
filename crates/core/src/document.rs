//! Document record and analysis block types.
//!
//! A [`DocumentRecord`] is the single piece of state shared by the pipeline
//! stages. Its [`Status`] only moves forward, with `failed` reachable from
//! any non-terminal state.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::blob::BlobId;
use crate::extract::ContentKind;
use crate::fetch::FetchAttempt;
use crate::layout::ContentCategory;
use crate::validate::ValidationResult;

/// Maximum number of blocks stored for a document.
pub const MAX_BLOCKS: usize = 6;

/// Grid capacity available to a document's blocks.
pub const GRID_BUDGET: u32 = 8;

/// Identifier of a document record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of a document.
///
/// ```text
/// pending → scraping → scraped → validating ─┬→ validated → analyzing → completed
///                                            └→ validation_failed
/// (any non-terminal) → failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Scraping,
    Scraped,
    Validating,
    Validated,
    ValidationFailed,
    Analyzing,
    Completed,
    Failed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scraping => "scraping",
            Self::Scraped => "scraped",
            Self::Validating => "validating",
            Self::Validated => "validated",
            Self::ValidationFailed => "validation_failed",
            Self::Analyzing => "analyzing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::ValidationFailed)
    }

    /// Whether moving from `self` to `next` respects the lifecycle.
    pub fn can_advance_to(&self, next: Status) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == Self::Failed {
            return true;
        }
        matches!(
            (self, next),
            (Self::Pending, Self::Scraping)
                | (Self::Scraping, Self::Scraped)
                | (Self::Scraped, Self::Validating)
                | (Self::Validating, Self::Validated)
                | (Self::Validating, Self::ValidationFailed)
                | (Self::Validated, Self::Analyzing)
                | (Self::Analyzing, Self::Completed)
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of analysis block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Summary,
    KeyPoints,
    Architecture,
    Diagram,
    Code,
    ApiReference,
    Guide,
    Comparison,
    BestPractices,
    Troubleshooting,
}

impl BlockType {
    pub const ALL: [BlockType; 10] = [
        Self::Summary,
        Self::KeyPoints,
        Self::Architecture,
        Self::Diagram,
        Self::Code,
        Self::ApiReference,
        Self::Guide,
        Self::Comparison,
        Self::BestPractices,
        Self::Troubleshooting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::KeyPoints => "key_points",
            Self::Architecture => "architecture",
            Self::Diagram => "diagram",
            Self::Code => "code",
            Self::ApiReference => "api_reference",
            Self::Guide => "guide",
            Self::Comparison => "comparison",
            Self::BestPractices => "best_practices",
            Self::Troubleshooting => "troubleshooting",
        }
    }

    /// Short description used in the prompt's output contract.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Summary => "Overview explanation",
            Self::KeyPoints => "Important highlights",
            Self::Architecture => "System or component structure",
            Self::Diagram => "Visual diagram in mermaid syntax",
            Self::Code => "Code example; set metadata.language",
            Self::ApiReference => "API documentation",
            Self::Guide => "Step-by-step instructions",
            Self::Comparison => "Comparison of approaches",
            Self::BestPractices => "Recommendations",
            Self::Troubleshooting => "Common issues and solutions",
        }
    }
}

impl FromStr for BlockType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "summary" => Ok(Self::Summary),
            "key_points" => Ok(Self::KeyPoints),
            "architecture" => Ok(Self::Architecture),
            "diagram" | "mermaid" => Ok(Self::Diagram),
            "code" => Ok(Self::Code),
            "api_reference" => Ok(Self::ApiReference),
            "guide" => Ok(Self::Guide),
            "comparison" => Ok(Self::Comparison),
            "best_practices" => Ok(Self::BestPractices),
            "troubleshooting" => Ok(Self::Troubleshooting),
            other => Err(format!("unknown block type: {}", other)),
        }
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visual size of a block on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockSize {
    Small,
    Medium,
    Large,
}

impl BlockSize {
    /// Grid units consumed by this size.
    pub fn unit_cost(&self) -> u32 {
        match self {
            Self::Small => 1,
            Self::Medium => 2,
            Self::Large => 3,
        }
    }

    /// The next smaller size, if any.
    pub fn downgrade(&self) -> Option<BlockSize> {
        match self {
            Self::Large => Some(Self::Medium),
            Self::Medium => Some(Self::Small),
            Self::Small => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }
}

impl FromStr for BlockSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "small" => Ok(Self::Small),
            "medium" => Ok(Self::Medium),
            "large" => Ok(Self::Large),
            other => Err(format!("unknown block size: {}", other)),
        }
    }
}

impl fmt::Display for BlockSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A titled, typed, sized unit of analysis content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    #[serde(rename = "type")]
    pub block_type: BlockType,
    pub size: BlockSize,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Total grid units consumed by `blocks`.
pub fn total_units(blocks: &[Block]) -> u32 {
    blocks.iter().map(|b| b.size.unit_cost()).sum()
}

/// Extracted text or HTML, stored inline or handed off to the blob store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "storage", rename_all = "snake_case")]
pub enum TextPayload {
    Inline { text: String },
    Blob { id: BlobId, len: usize },
}

impl TextPayload {
    /// Length of the payload in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Inline { text } => text.len(),
            Self::Blob { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Diagnostics accumulated while a document moves through the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineMetadata {
    /// Name of the strategy whose payload was used.
    pub fetch_method: Option<String>,
    /// Every fetch attempt, in order.
    pub fetch_attempts: Vec<FetchAttempt>,
    pub content_kind: Option<ContentKind>,
    pub page_count: Option<usize>,
    pub validation: Option<ValidationResult>,
    pub content_category: Option<ContentCategory>,
    /// Generative calls made for the analysis, including the successful one.
    pub synthesis_attempts: u32,
}

/// The document record shared by all stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub url: String,
    pub status: Status,
    pub instructions: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub extracted_text: Option<TextPayload>,
    pub extracted_html: Option<TextPayload>,
    pub word_count: usize,
    pub analysis_summary: Option<String>,
    pub analysis_blocks: Vec<Block>,
    pub error_message: Option<String>,
    pub metadata: PipelineMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentRecord {
    /// Creates a pending record for a submitted URL.
    pub fn new(url: impl Into<String>, instructions: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: DocumentId::new(),
            url: url.into(),
            status: Status::Pending,
            instructions,
            title: None,
            description: None,
            extracted_text: None,
            extracted_html: None,
            word_count: 0,
            analysis_summary: None,
            analysis_blocks: Vec::new(),
            error_message: None,
            metadata: PipelineMetadata::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies an update, bumping `updated_at`.
    pub fn apply(&mut self, update: RecordUpdate) {
        self.status = update.status;
        if let Some(title) = update.title {
            self.title = Some(title);
        }
        if let Some(description) = update.description {
            self.description = Some(description);
        }
        if let Some(text) = update.extracted_text {
            self.extracted_text = Some(text);
        }
        if let Some(html) = update.extracted_html {
            self.extracted_html = Some(html);
        }
        if let Some(word_count) = update.word_count {
            self.word_count = word_count;
        }
        if let Some(summary) = update.analysis_summary {
            self.analysis_summary = Some(summary);
        }
        if let Some(blocks) = update.analysis_blocks {
            self.analysis_blocks = blocks;
        }
        if let Some(message) = update.error_message {
            self.error_message = Some(message);
        }
        if let Some(metadata) = update.metadata {
            self.metadata = metadata;
        }
        self.updated_at = Utc::now();
    }
}

/// A partial write to a document record.
///
/// `status` is always written; other fields only when `Some`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordUpdate {
    pub status: Status,
    pub title: Option<String>,
    pub description: Option<String>,
    pub extracted_text: Option<TextPayload>,
    pub extracted_html: Option<TextPayload>,
    pub word_count: Option<usize>,
    pub analysis_summary: Option<String>,
    pub analysis_blocks: Option<Vec<Block>>,
    pub error_message: Option<String>,
    pub metadata: Option<PipelineMetadata>,
}

impl RecordUpdate {
    /// An update that only changes the status.
    pub fn status(status: Status) -> Self {
        Self {
            status,
            title: None,
            description: None,
            extracted_text: None,
            extracted_html: None,
            word_count: None,
            analysis_summary: None,
            analysis_blocks: None,
            error_message: None,
            metadata: None,
        }
    }

    /// A terminal failure update carrying a human-readable message.
    pub fn failure(status: Status, message: impl Into<String>) -> Self {
        Self { error_message: Some(message.into()), ..Self::status(status) }
    }

    pub fn metadata(mut self, metadata: PipelineMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
