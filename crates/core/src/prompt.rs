//! Prompt construction for the analysis call.

use std::fmt::Write as _;

use crate::document::{BlockSize, BlockType, GRID_BUDGET, MAX_BLOCKS};

/// Configuration for prompt construction
#[derive(Debug, Clone)]
pub struct PromptConfig {
    /// Character budget for the embedded document text
    pub max_content_chars: usize,
    /// Used when the submitter gave no instructions
    pub default_instructions: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self { max_content_chars: 50_000, default_instructions: "Analyze this content comprehensively".to_string() }
    }
}

/// Document fields embedded in the prompt.
#[derive(Debug, Clone, Copy)]
pub struct PromptInput<'a> {
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub instructions: Option<&'a str>,
    pub url: &'a str,
    pub text: &'a str,
}

const OMISSION_MARKER: &str = "\n\n[... content omitted ...]\n\n";

/// Build the analysis prompt.
pub fn build_prompt(input: &PromptInput<'_>, config: &PromptConfig) -> String {
    let instructions = input
        .instructions
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(&config.default_instructions);
    let content = truncate_prioritized(input.text, config.max_content_chars);

    let mut prompt = String::with_capacity(content.len() + 4096);
    prompt.push_str(
        "You are an expert technical documentation analyzer. Analyze the following web content and create a \
         comprehensive explanation with visual elements.\n\n",
    );
    let _ = writeln!(prompt, "CONTENT TITLE: {}", input.title);
    let _ = writeln!(prompt, "CONTENT DESCRIPTION: {}", input.description.unwrap_or("No description available"));
    let _ = writeln!(prompt, "SOURCE URL: {}", input.url);
    let _ = writeln!(prompt, "USER INSTRUCTIONS: {}", instructions);
    let _ = write!(prompt, "\nCONTENT:\n{}\n\n", content);
    prompt.push_str(&output_contract());
    prompt
}

/// The response format the model must follow.
fn output_contract() -> String {
    let types: Vec<&str> = BlockType::ALL.iter().map(BlockType::as_str).collect();
    let mut contract = String::new();

    contract.push_str(
        "TASK: Create a structured analysis with a summary and visual blocks. Respond with ONE JSON object and \
         nothing else, using this structure:\n\n",
    );
    let _ = write!(
        contract,
        r#"{{
  "summary": "A comprehensive summary of the document content",
  "blocks": [
    {{
      "id": "block-1",
      "type": "{}",
      "size": "small|medium|large",
      "title": "Block title",
      "content": "Block content (mermaid syntax for diagram blocks)",
      "metadata": {{ "language": "language of code blocks" }}
    }}
  ]
}}
"#,
        types.join("|")
    );

    contract.push_str("\nBLOCK TYPES:\n");
    for block_type in BlockType::ALL {
        let _ = writeln!(contract, "- {}: {}", block_type.as_str(), block_type.description());
    }

    contract.push_str("\nSIZES:\n");
    for (size, use_for) in [
        (BlockSize::Small, "quick facts, simple explanations"),
        (BlockSize::Medium, "detailed explanations, moderate diagrams"),
        (BlockSize::Large, "complex diagrams, comprehensive guides"),
    ] {
        let _ = writeln!(contract, "- {}: {} ({} grid unit(s))", size.as_str(), use_for, size.unit_cost());
    }

    let _ = write!(
        contract,
        "\nRULES:\n\
         - At most {MAX_BLOCKS} blocks, each of a different type.\n\
         - The sizes of all blocks together must not exceed {GRID_BUDGET} grid units.\n\
         - Prioritize content according to the user instructions.\n\
         - Use valid mermaid syntax for diagram blocks and set metadata.language for code blocks.\n\
         - The response must be valid JSON.\n"
    );
    contract
}

/// Truncate `text` to at most `budget` characters, keeping what matters most.
///
/// The first 25% and last 10% of the budget are kept verbatim. The rest of
/// the budget is filled, in document order, with headings and complete
/// fenced code blocks from the omitted middle, separated by omission markers.
pub fn truncate_prioritized(text: &str, budget: usize) -> String {
    let total = text.chars().count();
    if total <= budget {
        return text.to_string();
    }

    let marker_len = OMISSION_MARKER.chars().count();
    let head_len = budget / 4;
    let tail_len = budget / 10;
    if head_len + tail_len + marker_len > budget {
        return text.chars().take(budget).collect();
    }

    let head_end = byte_offset(text, head_len);
    let tail_start = byte_offset(text, total - tail_len);
    let (head, middle, tail) = (&text[..head_end], &text[head_end..tail_start], &text[tail_start..]);

    let mut remaining = budget - head_len - tail_len - marker_len;
    let mut out = String::with_capacity(text.len().min(budget * 4));
    out.push_str(head);

    for segment in important_segments(middle) {
        let cost = segment.chars().count() + marker_len;
        if cost <= remaining {
            out.push_str(OMISSION_MARKER);
            out.push_str(&segment);
            remaining -= cost;
        }
    }

    out.push_str(OMISSION_MARKER);
    out.push_str(tail);
    out
}

/// Headings and complete fenced code blocks, in order. A fence left open at
/// the end of the region is dropped.
fn important_segments(region: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut fence: Option<(String, Vec<&str>)> = None;

    for line in region.lines() {
        let trimmed = line.trim_start();
        match fence.as_mut() {
            Some((marker, lines)) => {
                lines.push(line);
                if trimmed.starts_with(marker.as_str()) {
                    segments.push(lines.join("\n"));
                    fence = None;
                }
            }
            None if trimmed.starts_with("```") || trimmed.starts_with("~~~") => {
                fence = Some((trimmed[..3].to_string(), vec![line]));
            }
            None if is_heading(trimmed) => segments.push(trimmed.to_string()),
            None => {}
        }
    }

    segments
}

fn is_heading(line: &str) -> bool {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    (1..=6).contains(&hashes) && line[hashes..].starts_with(' ')
}

fn byte_offset(text: &str, chars: usize) -> usize {
    text.char_indices().nth(chars).map(|(i, _)| i).unwrap_or(text.len())
}
