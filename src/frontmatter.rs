//! Marker-file front-matter parsing.
//!
//! Skill authors describe their skill in a YAML block fenced by `---`
//! lines at the top of the marker file. Authors are not always careful,
//! so parsing is permissive: `category` and `categories` are both
//! accepted, values may be a single string or a list, and a malformed
//! block degrades to an empty result rather than failing ingestion.

use serde_yaml::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontMatter {
    pub name: Option<String>,
    pub description: Option<String>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ParsedMarker {
    pub front: FrontMatter,
    /// Marker content below the front-matter block.
    pub body: String,
}

pub fn parse(content: &str) -> ParsedMarker {
    let (yaml, body) = match split_fences(content) {
        Some((yaml, body)) => (yaml, body),
        None => {
            return ParsedMarker {
                front: FrontMatter::default(),
                body: content.to_string(),
            }
        }
    };

    let front = match serde_yaml::from_str::<Value>(yaml) {
        Ok(Value::Mapping(map)) => {
            let mut front = FrontMatter {
                name: scalar_string(map.get(Value::from("name"))),
                description: scalar_string(map.get(Value::from("description"))),
                categories: Vec::new(),
                tags: Vec::new(),
            };
            for key in ["category", "categories"] {
                front
                    .categories
                    .extend(string_items(map.get(Value::from(key))));
            }
            for key in ["keywords", "tags"] {
                front.tags.extend(string_items(map.get(Value::from(key))));
            }
            dedup_in_place(&mut front.categories);
            dedup_in_place(&mut front.tags);
            front
        }
        _ => FrontMatter::default(),
    };

    ParsedMarker {
        front,
        body: body.to_string(),
    }
}

/// Returns the YAML text and the remaining body when the content opens
/// with a `---` fence closed by a later `---` line.
fn split_fences(content: &str) -> Option<(&str, &str)> {
    let rest = content.strip_prefix("---")?;
    let rest = rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n"))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((yaml, body));
        }
        offset += line.len();
    }
    None
}

fn scalar_string(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        _ => None,
    }
}

/// Coerce a string-or-list value into trimmed items. A single string may
/// carry comma-separated entries.
fn string_items(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => s
            .split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect(),
        Some(Value::Sequence(seq)) => seq
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => {
                    let trimmed = s.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        Some(trimmed.to_string())
                    }
                }
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn dedup_in_place(items: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|item| seen.insert(item.to_lowercase()));
}
