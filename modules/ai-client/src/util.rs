/// Truncate a string to at most `max_bytes` bytes at a character boundary.
pub fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    &s[..end]
}

/// Strip markdown code fences from a model response.
pub fn strip_code_blocks(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Locate the outermost JSON object or array in a response that may carry
/// prose before or after it. Returns the fence-stripped input when no
/// bracketed span is found.
pub fn extract_json_payload(response: &str) -> &str {
    let stripped = strip_code_blocks(response);
    let start = stripped.find(['{', '[']);
    let end = stripped.rfind(['}', ']']);
    match (start, end) {
        (Some(s), Some(e)) if e > s => &stripped[s..=e],
        _ => stripped,
    }
}
