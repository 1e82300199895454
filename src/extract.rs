//! Extracts speakable text from a slide's structured content blocks.
//!
//! Blocks arrive as loosely-typed JSON because the content store supports
//! many block shapes. Extraction prefers, per block: a direct string
//! payload, then a `text` field, then a `content` field, then an `items`
//! array whose entries are joined with ". ". Anything else contributes
//! nothing. Pure and deterministic: the same blocks always produce
//! byte-identical output.

use serde_json::Value;

/// Flatten ordered content blocks into one narration-ready text blob.
/// Non-empty per-block strings are joined with a blank line. Absence of
/// extractable text yields an empty string, never an error.
pub fn extract_speakable_text(blocks: &[Value]) -> String {
    let parts: Vec<String> = blocks.iter().filter_map(block_text).collect();
    parts.join("\n\n")
}

fn block_text(block: &Value) -> Option<String> {
    if let Some(s) = block.as_str() {
        return non_empty(s);
    }
    if let Some(s) = block.get("text").and_then(Value::as_str) {
        return non_empty(s);
    }
    if let Some(s) = block.get("content").and_then(Value::as_str) {
        return non_empty(s);
    }
    if let Some(items) = block.get("items").and_then(Value::as_array) {
        let joined = items
            .iter()
            .filter_map(item_text)
            .collect::<Vec<String>>()
            .join(". ");
        return non_empty(&joined);
    }
    None
}

// List items reuse the same preference order, minus nested lists.
fn item_text(item: &Value) -> Option<String> {
    if let Some(s) = item.as_str() {
        return non_empty(s);
    }
    if let Some(s) = item.get("text").and_then(Value::as_str) {
        return non_empty(s);
    }
    if let Some(s) = item.get("content").and_then(Value::as_str) {
        return non_empty(s);
    }
    None
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_direct_string_blocks() {
        let blocks = vec![json!("First point"), json!("Second point")];
        assert_eq!(
            extract_speakable_text(&blocks),
            "First point\n\nSecond point"
        );
    }

    #[test]
    fn test_text_field_preferred_over_content() {
        let blocks = vec![json!({"text": "from text", "content": "from content"})];
        assert_eq!(extract_speakable_text(&blocks), "from text");
    }

    #[test]
    fn test_content_field_fallback() {
        let blocks = vec![json!({"kind": "paragraph", "content": "body copy"})];
        assert_eq!(extract_speakable_text(&blocks), "body copy");
    }

    #[test]
    fn test_items_joined_with_periods() {
        let blocks = vec![json!({
            "kind": "bullets",
            "items": ["Ship faster", {"text": "Break less"}, "Sleep more"]
        })];
        assert_eq!(
            extract_speakable_text(&blocks),
            "Ship faster. Break less. Sleep more"
        );
    }

    #[test]
    fn test_unrecognized_blocks_contribute_nothing() {
        let blocks = vec![
            json!({"kind": "image", "url": "https://x/pic.png"}),
            json!("Spoken line"),
            json!(42),
            json!(null),
        ];
        assert_eq!(extract_speakable_text(&blocks), "Spoken line");
    }

    #[test]
    fn test_empty_and_whitespace_blocks_skipped() {
        let blocks = vec![json!(""), json!("   "), json!({"text": "\n\t"})];
        assert_eq!(extract_speakable_text(&blocks), "");
    }

    #[test]
    fn test_no_blocks_yields_empty_string() {
        assert_eq!(extract_speakable_text(&[]), "");
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let blocks = vec![
            json!("Intro"),
            json!({"text": "Middle"}),
            json!({"items": ["a", "b"]}),
        ];
        let first = extract_speakable_text(&blocks);
        let second = extract_speakable_text(&blocks);
        assert_eq!(first, second, "re-running must be byte-identical");
    }

    #[test]
    fn test_mixed_block_document() {
        let blocks = vec![
            json!("Welcome to the quarterly review"),
            json!({"kind": "chart", "series": [1, 2, 3]}),
            json!({"items": ["Revenue up 12%", "Churn down 3%"]}),
        ];
        assert_eq!(
            extract_speakable_text(&blocks),
            "Welcome to the quarterly review\n\nRevenue up 12%. Churn down 3%"
        );
    }
}
