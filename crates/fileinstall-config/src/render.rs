//! Descriptor rendering and variable substitution.

use std::path::Path;

use serde_yaml::{Mapping, Value};

/// Fixed header of every generated descriptor.
pub const DESCRIPTOR_HEADER: &str = "# Auto generated, do not change.";

/// Absolute path of the workspace root.
pub const VAR_WORKSPACE_ROOT: &str = "@{workspace-root-path}";
/// Name of the worker unit.
pub const VAR_WORKER_NAME: &str = "@{worker-unit-name}";
/// Absolute path of the worker unit.
pub const VAR_WORKER_PATH: &str = "@{worker-unit-path}";

/// Render a template mapping as flat `key=value` text.
///
/// Nested mappings become dotted keys; keys are sorted so that the same
/// template always renders to the same bytes.
pub fn render_flat(template: &Mapping) -> String {
    let mut entries = Vec::new();
    flatten_into(&mut entries, "", template);
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut text = String::from(DESCRIPTOR_HEADER);
    text.push('\n');
    for (key, value) in entries {
        text.push_str(&key);
        text.push('=');
        text.push_str(&value);
        text.push('\n');
    }
    text
}

fn flatten_into(entries: &mut Vec<(String, String)>, prefix: &str, mapping: &Mapping) {
    for (key, value) in mapping {
        let Some(key) = scalar_text(key) else {
            continue;
        };
        let key = if prefix.is_empty() {
            key
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Mapping(inner) => flatten_into(entries, &key, inner),
            Value::Tagged(tagged) => match &tagged.value {
                Value::Mapping(inner) => flatten_into(entries, &key, inner),
                other => entries.push((key, leaf_text(other))),
            },
            other => entries.push((key, leaf_text(other))),
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn leaf_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Sequence(items) => items
            .iter()
            .map(leaf_text)
            .collect::<Vec<_>>()
            .join(","),
        Value::Tagged(tagged) => leaf_text(&tagged.value),
        other => scalar_text(other).unwrap_or_default(),
    }
}

/// Values substituted into descriptor paths and bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variables {
    entries: Vec<(&'static str, String)>,
}

impl Variables {
    /// Resolve the variable table for one worker.
    pub fn new(workspace_root: &Path, worker_name: &str, worker_path: &Path) -> Self {
        Self {
            entries: vec![
                (VAR_WORKSPACE_ROOT, workspace_root.display().to_string()),
                (VAR_WORKER_NAME, worker_name.to_string()),
                (VAR_WORKER_PATH, worker_path.display().to_string()),
            ],
        }
    }

    /// Plain find/replace of every variable in `text`.
    pub fn substitute(&self, text: &str) -> String {
        let mut text = text.to_string();
        for (name, value) in &self.entries {
            text = text.replace(name, value);
        }
        text
    }
}
