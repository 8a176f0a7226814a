//! 从模型回复中提取结构化 JSON
//!
//! 依次尝试：
//! 1. Markdown 代码块（```json ... ```）
//! 2. 在原文中按括号配对扫描 JSON 对象
//!
//! 提取失败返回 `None`，由调用方决定重试还是放弃。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

fn fenced_block() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```(?:json|JSON)?[ \t]*\r?\n([\s\S]*?)\r?\n?```").ok())
        .as_ref()
}

/// 提取回复中的第一个 JSON 对象
pub fn extract_json(raw: &str) -> Option<Value> {
    let text = raw.trim().trim_start_matches('\u{feff}');
    if text.is_empty() {
        return None;
    }

    for caps in fenced_block().into_iter().flat_map(|re| re.captures_iter(text)) {
        if let Some(value) = caps.get(1).and_then(|m| parse_object(m.as_str())) {
            debug!("从 Markdown 代码块中提取到 JSON");
            return Some(value);
        }
    }

    let value = scan_balanced(text);
    if value.is_some() {
        debug!("通过括号配对提取到 JSON");
    }
    value
}

fn parse_object(candidate: &str) -> Option<Value> {
    serde_json::from_str::<Value>(candidate.trim())
        .ok()
        .filter(Value::is_object)
}

/// 从每个 `{` 起扫描到配对的 `}`，跳过字符串字面量中的括号
fn scan_balanced(text: &str) -> Option<Value> {
    let bytes = text.as_bytes();
    let mut start = text.find('{')?;

    loop {
        if let Some(end) = matching_brace(bytes, start) {
            if let Some(value) = parse_object(&text[start..=end]) {
                return Some(value);
            }
        }
        start += 1 + text[start + 1..].find('{')?;
    }
}

fn matching_brace(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}
