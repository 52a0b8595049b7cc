//! Frontmatter parsing and formatting.
//!
//! Reading and writing SKILL.md documents. Output is deterministic (fixed
//! field order, quoted strings), so rewriting an unchanged skill produces
//! byte-identical content.

use serde_yaml::{Mapping, Value};

use crate::error::{FormatError, ParseError};
use crate::skill::{Frontmatter, FIELD_ORDER};

/// Parse a SKILL.md into frontmatter and body.
///
/// The frontmatter is the YAML mapping between the leading `---` delimiters.
/// A file without a leading delimiter has empty frontmatter and its whole
/// content is the body. The body is returned trimmed.
///
/// # Errors
///
/// Returns an error if:
/// - The frontmatter isn't properly closed
/// - The YAML is invalid
/// - The frontmatter isn't a mapping
/// - Any key isn't a string
pub fn parse_frontmatter(content: &str) -> Result<(Frontmatter, String), ParseError> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let Some((frontmatter_str, body)) = split_frontmatter(content)? else {
        return Ok((Frontmatter::new(), content.trim().to_string()));
    };
    let body = body.trim().to_string();

    let parsed: Value = serde_yaml::from_str(frontmatter_str)?;

    match parsed {
        Value::Mapping(map) => Ok((mapping_to_btreemap(map)?, body)),
        Value::Null => Ok((Frontmatter::new(), body)),
        _ => Err(ParseError::NotAMapping),
    }
}

fn split_frontmatter(content: &str) -> Result<Option<(&str, &str)>, ParseError> {
    let mut lines = content.split_inclusive('\n');
    let Some(first_line) = lines.next() else {
        return Ok(None);
    };

    if trim_line_ending(first_line) != "---" {
        return Ok(None);
    }

    let mut offset = first_line.len();
    for line in lines {
        if trim_line_ending(line) == "---" {
            let frontmatter = &content[first_line.len()..offset];
            let body = &content[offset + line.len()..];
            return Ok(Some((frontmatter, body)));
        }
        offset += line.len();
    }

    Err(ParseError::UnclosedFrontmatter)
}

fn trim_line_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// Render a complete SKILL.md from frontmatter and body.
pub fn render_skill(frontmatter: &Frontmatter, body: &str) -> Result<String, FormatError> {
    let formatted = format_frontmatter(frontmatter)?;
    let mut content = format!("{formatted}\n\n{}", body.trim());
    content = content.trim_end().to_string();
    content.push('\n');
    Ok(content)
}

/// Format metadata back into YAML frontmatter.
///
/// Known fields come first in a fixed order, remaining fields follow
/// alphabetically. Nested mappings are written in block style with their keys
/// sorted; strings are always quoted.
pub fn format_frontmatter(metadata: &Frontmatter) -> Result<String, FormatError> {
    let mut lines: Vec<String> = vec!["---".to_string()];

    for field in FIELD_ORDER {
        if let Some(value) = metadata.get(field) {
            emit_entry(&mut lines, 0, field, value)?;
        }
    }

    for (key, value) in metadata
        .iter()
        .filter(|(key, _)| !FIELD_ORDER.contains(&key.as_str()))
    {
        emit_entry(&mut lines, 0, key, value)?;
    }

    lines.push("---".to_string());
    Ok(lines.join("\n"))
}

fn emit_entry(
    lines: &mut Vec<String>,
    depth: usize,
    key: &str,
    value: &Value,
) -> Result<(), FormatError> {
    let pad = "  ".repeat(depth);
    match value {
        Value::Mapping(map) if !map.is_empty() => {
            lines.push(format!("{pad}{}:", format_key(key)));
            for (sub_key, sub_value) in sorted_entries(map)? {
                emit_entry(lines, depth + 1, &sub_key, sub_value)?;
            }
        }
        Value::Sequence(items) if !items.is_empty() => {
            lines.push(format!("{pad}{}:", format_key(key)));
            for item in items {
                lines.push(format!("{pad}  - {}", format_flow(item)?));
            }
        }
        _ => lines.push(format!("{pad}{}: {}", format_key(key), format_flow(value)?)),
    }
    Ok(())
}

/// Inline (flow style) rendering, used for scalars and sequence items.
fn format_flow(value: &Value) -> Result<String, FormatError> {
    match value {
        Value::Mapping(map) => {
            let entries = sorted_entries(map)?
                .into_iter()
                .map(|(key, val)| Ok(format!("{}: {}", json_quote(&key), format_flow(val)?)))
                .collect::<Result<Vec<_>, FormatError>>()?;
            Ok(format!("{{{}}}", entries.join(", ")))
        }
        Value::Sequence(items) => {
            let entries = items
                .iter()
                .map(format_flow)
                .collect::<Result<Vec<_>, FormatError>>()?;
            Ok(format!("[{}]", entries.join(", ")))
        }
        _ => format_yaml_scalar(value),
    }
}

fn sorted_entries(map: &Mapping) -> Result<Vec<(String, &Value)>, FormatError> {
    let mut entries = map
        .iter()
        .map(|(key, value)| Ok((value_to_string(key)?, value)))
        .collect::<Result<Vec<_>, FormatError>>()?;
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

/// Convert a YAML scalar to a string representation.
pub fn value_to_string(value: &Value) -> Result<String, FormatError> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(num) => Ok(num.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok("null".to_string()),
        _ => Err(FormatError::UnsupportedValueType),
    }
}

/// Convert a `serde_yaml` Mapping to a `BTreeMap` with string keys.
pub fn mapping_to_btreemap(map: Mapping) -> Result<Frontmatter, ParseError> {
    let mut result = Frontmatter::new();
    for (key, value) in map {
        let key_str = match key {
            Value::String(text) => text,
            _ => return Err(ParseError::NonStringKey),
        };
        result.insert(key_str, value);
    }
    Ok(result)
}

/// Format a key, adding quotes if needed.
pub fn format_key(value: &str) -> String {
    if is_simple_key(value) {
        value.to_string()
    } else {
        json_quote(value)
    }
}

fn is_simple_key(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}

fn json_quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

fn format_yaml_scalar(value: &Value) -> Result<String, FormatError> {
    match value {
        // Always quote strings to avoid YAML implicit type coercion (e.g. "true", "1").
        Value::String(text) => Ok(json_quote(text)),
        Value::Number(num) => Ok(num.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok("null".to_string()),
        Value::Mapping(_) | Value::Sequence(_) | Value::Tagged(_) => {
            Err(FormatError::UnsupportedValueType)
        }
    }
}
