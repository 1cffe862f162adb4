use serde_json::Value;

/// Extracts a JSON object from a raw LLM completion, tolerating the two
/// forms real models actually return (§4.1/§4.2): a ```` ```json ```` fenced
/// block, and a `<think>...</think>` reasoning preamble before the answer.
/// Falls back to the last balanced `{...}` span in the text. Returns the
/// raw text unparsed on no-match so the caller's serde error carries the
/// original content.
pub fn extract_json(raw: &str) -> Result<Value, serde_json::Error> {
    let without_think = strip_think_block(raw);
    let candidate = extract_fenced_block(without_think).unwrap_or_else(|| without_think.to_string());
    match serde_json::from_str::<Value>(candidate.trim()) {
        Ok(value) => Ok(value),
        Err(_) => {
            let span = last_balanced_object(without_think).unwrap_or_else(|| candidate.clone());
            serde_json::from_str(span.trim())
        }
    }
}

fn strip_think_block(raw: &str) -> &str {
    match (raw.find("<think>"), raw.find("</think>")) {
        (Some(start), Some(end)) if end > start => {
            let after = end + "</think>".len();
            raw[after..].trim_start()
        }
        _ => raw,
    }
}

fn extract_fenced_block(raw: &str) -> Option<String> {
    let start_marker = raw.find("```json").map(|i| i + "```json".len()).or_else(|| raw.find("```").map(|i| i + 3))?;
    let rest = &raw[start_marker..];
    let end = rest.find("```")?;
    Some(rest[..end].to_string())
}

/// Finds the last `{...}` span whose braces balance, scanning string
/// literals so braces inside quoted text don't throw off the count.
fn last_balanced_object(raw: &str) -> Option<String> {
    let bytes: Vec<char> = raw.chars().collect();
    let mut best: Option<(usize, usize)> = None;
    let mut stack: Vec<usize> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push(i),
            '}' => {
                if let Some(start) = stack.pop() {
                    if stack.is_empty() {
                        best = Some((start, i));
                    }
                }
            }
            _ => {}
        }
    }

    best.map(|(start, end)| bytes[start..=end].iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_plain_json() {
        let value = extract_json(r#"{"a": 1}"#).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn extracts_fenced_json() {
        let raw = "Here is the plan:\n```json\n{\"a\": 2}\n```\nThanks.";
        let value = extract_json(raw).unwrap();
        assert_eq!(value["a"], 2);
    }

    #[test]
    fn strips_think_block_before_parsing() {
        let raw = "<think>let me reason about this</think>\n{\"a\": 3}";
        let value = extract_json(raw).unwrap();
        assert_eq!(value["a"], 3);
    }

    #[test]
    fn falls_back_to_last_balanced_object_with_trailing_prose() {
        let raw = "I considered {\"ignored\": true} first, then decided: {\"a\": 4}\nDone.";
        let value = extract_json(raw).unwrap();
        assert_eq!(value["a"], 4);
    }

    #[test]
    fn braces_inside_string_literals_do_not_break_balancing() {
        let raw = r#"{"a": "looks like a brace } here", "b": 5}"#;
        let value = extract_json(raw).unwrap();
        assert_eq!(value["b"], 5);
    }
}
