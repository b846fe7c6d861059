//! Parsing of model output into summary and blocks.

use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::document::{Block, BlockSize, BlockType, MAX_BLOCKS};

/// Model output that does not carry the expected JSON structure.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("malformed model response: {0}")]
pub struct MalformedResponse(pub String);

/// Validated analysis produced by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResponse {
    pub summary: String,
    pub blocks: Vec<Block>,
}

/// Locate the first balanced top-level JSON object in `text`.
///
/// Braces inside string literals (including escaped quotes) are ignored, so
/// prose or code fences around the object do not matter.
pub fn find_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Parse raw model text.
///
/// Blocks without a known type and size, or with an empty title or content,
/// are dropped. At most [`MAX_BLOCKS`] are kept. Missing or duplicate ids are
/// replaced with `block-N`.
pub fn parse_response(text: &str) -> Result<AnalysisResponse, MalformedResponse> {
    let json = find_json_object(text).ok_or_else(|| MalformedResponse("no JSON object found".to_string()))?;
    let value: Value = serde_json::from_str(json).map_err(|e| MalformedResponse(format!("invalid JSON: {}", e)))?;

    let Value::Object(object) = value else {
        return Err(MalformedResponse("top-level value is not an object".to_string()));
    };
    let summary = match object.get("summary") {
        Some(Value::String(s)) => s.clone(),
        _ => return Err(MalformedResponse("'summary' is missing or not a string".to_string())),
    };
    let Some(Value::Array(raw_blocks)) = object.get("blocks") else {
        return Err(MalformedResponse("'blocks' is missing or not an array".to_string()));
    };

    let mut blocks: Vec<Block> = raw_blocks.iter().filter_map(parse_block).take(MAX_BLOCKS).collect();
    if blocks.len() < raw_blocks.len() {
        tracing::debug!(received = raw_blocks.len(), kept = blocks.len(), "dropped invalid or excess blocks");
    }
    assign_ids(&mut blocks);

    Ok(AnalysisResponse { summary, blocks })
}

fn parse_block(value: &Value) -> Option<Block> {
    let object = value.as_object()?;
    let block_type = BlockType::from_str(object.get("type")?.as_str()?).ok()?;
    let size = BlockSize::from_str(object.get("size")?.as_str()?).ok()?;
    let title = non_empty(object, "title")?;
    let content = non_empty(object, "content")?;
    let id = object.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
    let metadata = object.get("metadata").and_then(Value::as_object).map(stringify_metadata).unwrap_or_default();

    Some(Block { id, block_type, size, title, content, metadata })
}

fn non_empty(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key)?.as_str().filter(|s| !s.trim().is_empty()).map(str::to_string)
}

fn stringify_metadata(object: &Map<String, Value>) -> BTreeMap<String, String> {
    object
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect()
}

fn assign_ids(blocks: &mut [Block]) {
    let mut seen = HashSet::new();
    let mut next = 1;

    for index in 0..blocks.len() {
        let id = blocks[index].id.trim().to_string();
        if !id.is_empty() && seen.insert(id.clone()) {
            blocks[index].id = id;
            continue;
        }

        let mut candidate = format!("block-{}", index + 1);
        while seen.contains(&candidate) || blocks[index + 1..].iter().any(|b| b.id.trim() == candidate) {
            next += 1;
            candidate = format!("block-{}", blocks.len() + next);
        }
        seen.insert(candidate.clone());
        blocks[index].id = candidate;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("{\"a\":1}", Some("{\"a\":1}"))]
    #[case("Here you go:\n```json\n{\"a\":{\"b\":2}}\n```", Some("{\"a\":{\"b\":2}}"))]
    #[case("{\"s\":\"brace } in string\"} trailing {", Some("{\"s\":\"brace } in string\"}"))]
    #[case("{\"s\":\"escaped \\\" quote }\"}", Some("{\"s\":\"escaped \\\" quote }\"}"))]
    #[case("no json here", None)]
    #[case("{\"unbalanced\": {", None)]
    fn test_find_json_object(#[case] input: &str, #[case] expected: Option<&str>) {
        assert_eq!(find_json_object(input), expected);
    }

    #[test]
    fn test_schema_exact_response_round_trips() {
        let text = r#"{
            "summary": "A scheduler overview",
            "blocks": [
                {"id": "b1", "type": "summary", "size": "large", "title": "Overview", "content": "Text", "metadata": {}},
                {"id": "b2", "type": "code", "size": "medium", "title": "Example", "content": "fn main() {}", "metadata": {"language": "rust"}}
            ]
        }"#;
        let parsed = parse_response(text).unwrap();

        assert_eq!(parsed.summary, "A scheduler overview");
        assert_eq!(parsed.blocks.len(), 2);
        assert_eq!(parsed.blocks[0].id, "b1");
        assert_eq!(parsed.blocks[0].block_type, BlockType::Summary);
        assert_eq!(parsed.blocks[1].size, BlockSize::Medium);
        assert_eq!(parsed.blocks[1].metadata.get("language").map(String::as_str), Some("rust"));
    }

    #[test]
    fn test_invalid_blocks_filtered_and_capped() {
        let mut blocks = vec![
            r#"{"type": "unknown", "size": "small", "title": "T", "content": "C"}"#.to_string(),
            r#"{"type": "summary", "size": "huge", "title": "T", "content": "C"}"#.to_string(),
            r#"{"type": "summary", "size": "small", "title": " ", "content": "C"}"#.to_string(),
            r#"{"type": "summary", "size": "small", "title": "T"}"#.to_string(),
        ];
        for i in 0..8 {
            blocks.push(format!(r#"{{"type": "key_points", "size": "small", "title": "T{i}", "content": "C"}}"#));
        }
        let text = format!(r#"{{"summary": "s", "blocks": [{}]}}"#, blocks.join(","));

        let parsed = parse_response(&text).unwrap();
        assert_eq!(parsed.blocks.len(), MAX_BLOCKS);
        assert_eq!(parsed.blocks[0].title, "T0");
    }

    #[test]
    fn test_missing_and_duplicate_ids_assigned() {
        let text = r#"{"summary": "s", "blocks": [
            {"id": "x", "type": "summary", "size": "small", "title": "A", "content": "C"},
            {"id": "x", "type": "code", "size": "small", "title": "B", "content": "C"},
            {"type": "guide", "size": "small", "title": "C", "content": "C"}
        ]}"#;
        let parsed = parse_response(text).unwrap();
        let ids: Vec<&str> = parsed.blocks.iter().map(|b| b.id.as_str()).collect();

        assert_eq!(ids, vec!["x", "block-2", "block-3"]);
    }

    #[test]
    fn test_metadata_values_stringified() {
        let text = r#"{"summary": "s", "blocks": [
            {"type": "mermaid", "size": "small", "title": "Flow", "content": "graph TD; A-->B",
             "metadata": {"nodes": 2, "directed": true, "note": null}}
        ]}"#;
        let parsed = parse_response(text).unwrap();
        let block = &parsed.blocks[0];

        assert_eq!(block.block_type, BlockType::Diagram);
        assert_eq!(block.metadata.get("nodes").map(String::as_str), Some("2"));
        assert_eq!(block.metadata.get("directed").map(String::as_str), Some("true"));
        assert!(!block.metadata.contains_key("note"));
    }

    #[rstest]
    #[case("plain prose")]
    #[case("[1, 2, 3]")]
    #[case(r#"{"blocks": []}"#)]
    #[case(r#"{"summary": 3, "blocks": []}"#)]
    #[case(r#"{"summary": "s", "blocks": {}}"#)]
    #[case(r#"{"summary": "s", "blocks": [1,}"#)]
    fn test_malformed_responses(#[case] input: &str) {
        assert!(parse_response(input).is_err());
    }
}
