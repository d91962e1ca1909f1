use scale_mcp_client::ToolContent;
use serde_json::{Map, Value};

use crate::confirmation::PendingConfirmation;

pub const DEFAULT_MAX_ITEMS: usize = 50;
const MAX_HEALTH_DETAILS: usize = 10;
const MAX_VALUE_LEN: usize = 100;

/// Renders tool results and agent messages for the user.
pub trait ResponseFormatter: Send + Sync {
    fn format(&self, content: &ToolContent, title: Option<&str>) -> String;

    fn format_list(&self, items: &[Value], title: &str) -> String;

    fn format_health(&self, content: &ToolContent, title: &str) -> String;

    fn format_error(&self, error: &dyn std::error::Error, context: Option<&str>) -> String;

    fn format_confirmation(&self, pending: &PendingConfirmation) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthClass {
    Critical,
    Warning,
    Healthy,
    Unknown,
}

/// Bucket a health state or event by its `status` (or `severity`).
pub fn classify_health(item: &Value) -> HealthClass {
    let status = item
        .get("status")
        .or_else(|| item.get("severity"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_uppercase();
    match status.as_str() {
        "CRITICAL" | "ERROR" | "UNHEALTHY" => HealthClass::Critical,
        "WARNING" | "DEGRADED" => HealthClass::Warning,
        "HEALTHY" | "OK" | "NORMAL" => HealthClass::Healthy,
        _ => HealthClass::Unknown,
    }
}

/// The list inside a result: the value itself, or the first of `states`,
/// `events`, `quotas`, `snapshots`, `content` or `data` that holds an array.
pub fn list_items(content: &ToolContent) -> Vec<Value> {
    match content {
        ToolContent::Json(Value::Array(items)) => items.clone(),
        ToolContent::Json(Value::Object(map)) => ["states", "events", "quotas", "snapshots", "content", "data"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))
            .cloned()
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

#[derive(Debug, Clone)]
pub struct MarkdownFormatter {
    max_items: usize,
}

impl Default for MarkdownFormatter {
    fn default() -> Self {
        Self {
            max_items: DEFAULT_MAX_ITEMS,
        }
    }
}

impl MarkdownFormatter {
    pub fn new(max_items: usize) -> Self {
        Self { max_items }
    }

    fn health_states(&self, states: &[Value], title: &str) -> String {
        let mut lines = Vec::new();
        push_title(&mut lines, title);

        if states.is_empty() {
            lines.push("✅ No issues detected. All systems healthy.".to_string());
            return lines.join("\n");
        }

        let mut critical = Vec::new();
        let mut warning = Vec::new();
        let mut healthy = 0;
        let mut unknown = 0;
        for state in states {
            match classify_health(state) {
                HealthClass::Critical => critical.push(state),
                HealthClass::Warning => warning.push(state),
                HealthClass::Healthy => healthy += 1,
                HealthClass::Unknown => unknown += 1,
            }
        }

        let mut summary = Vec::new();
        if !critical.is_empty() {
            summary.push(format!("🔴 {} critical", critical.len()));
        }
        if !warning.is_empty() {
            summary.push(format!("🟡 {} warning", warning.len()));
        }
        if healthy > 0 {
            summary.push(format!("🟢 {} healthy", healthy));
        }
        if unknown > 0 {
            summary.push(format!("⚪ {} unknown", unknown));
        }
        lines.push(summary.join(" | "));
        lines.push(String::new());

        for (heading, group) in [("**Critical Issues:**", &critical), ("**Warnings:**", &warning)] {
            if group.is_empty() {
                continue;
            }
            lines.push(heading.to_string());
            for state in group.iter().take(MAX_HEALTH_DETAILS) {
                lines.push(format!("  • {}", health_item(state)));
            }
            lines.push(String::new());
        }

        lines.join("\n").trim_end().to_string()
    }
}

impl ResponseFormatter for MarkdownFormatter {
    fn format(&self, content: &ToolContent, title: Option<&str>) -> String {
        let mut lines = Vec::new();
        if let Some(title) = title {
            push_title(&mut lines, title);
        }

        match content {
            ToolContent::Text(text) => lines.push(text.clone()),
            ToolContent::Json(Value::Object(map)) => lines.push(format_map(map, 0)),
            ToolContent::Json(Value::Array(items)) => lines.push(self.list_body(items)),
            ToolContent::Json(other) => lines.push(format_value(other)),
            ToolContent::Empty => lines.push("*No data returned*".to_string()),
        }
        lines.join("\n")
    }

    fn format_list(&self, items: &[Value], title: &str) -> String {
        let mut lines = Vec::new();
        push_title(&mut lines, title);
        lines.push(self.list_body(items));
        lines.join("\n")
    }

    fn format_health(&self, content: &ToolContent, title: &str) -> String {
        match content {
            ToolContent::Json(Value::Array(states)) => self.health_states(states, title),
            ToolContent::Json(Value::Object(map)) => {
                match map.get("states").or_else(|| map.get("events")) {
                    Some(Value::Array(states)) => self.health_states(states, title),
                    _ => self.format(content, Some(title).filter(|t| !t.is_empty())),
                }
            }
            _ => self.format(content, Some(title).filter(|t| !t.is_empty())),
        }
    }

    fn format_error(&self, error: &dyn std::error::Error, context: Option<&str>) -> String {
        let mut lines = vec!["**❌ Error**".to_string(), String::new()];
        if let Some(context) = context {
            lines.push(format!("**Context:** {}", context));
            lines.push(String::new());
        }
        lines.push(format!("**Details:** {}", error));
        lines.join("\n")
    }

    fn format_confirmation(&self, pending: &PendingConfirmation) -> String {
        let mut lines = vec![
            "**⚠️ Confirmation Required**".to_string(),
            String::new(),
            format!("**Operation:** `{}`", pending.tool_name),
            format!("**Risk Level:** {}", pending.risk_level),
        ];
        if !pending.arguments.is_empty() {
            lines.push("**Arguments:**".to_string());
            for (key, value) in &pending.arguments {
                lines.push(format!("  • {}: {}", key, format_value(value)));
            }
        }
        lines.push(format!(
            "**Expires:** {} UTC",
            pending.expires_at.format("%H:%M:%S")
        ));
        lines.push(String::new());
        match &pending.confirmation_code {
            Some(code) => lines.push(format!(
                "Reply 'confirm {}' to proceed or 'cancel' to abort.",
                code
            )),
            None => lines.push("Reply 'confirm' to proceed or 'cancel' to abort.".to_string()),
        }
        lines.join("\n")
    }
}

impl MarkdownFormatter {
    fn list_body(&self, items: &[Value]) -> String {
        if items.is_empty() {
            return "*Empty list*".to_string();
        }

        let mut lines = vec![format!("*{} item(s)*", items.len()), String::new()];
        for (idx, item) in items.iter().take(self.max_items).enumerate() {
            lines.push(format!("{}. {}", idx + 1, list_item(item)));
        }
        if items.len() > self.max_items {
            lines.push(format!("*... and {} more*", items.len() - self.max_items));
        }
        lines.join("\n")
    }
}

fn push_title(lines: &mut Vec<String>, title: &str) {
    if !title.is_empty() {
        lines.push(format!("**{}**", title));
        lines.push(String::new());
    }
}

fn str_field<'a>(item: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| item.get(*key).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
}

fn health_item(item: &Value) -> String {
    let mut parts = Vec::new();
    if let Some(entity) = str_field(item, &["entityName", "name", "node"]) {
        parts.push(format!("`{}`", entity));
    }
    if let Some(status) = str_field(item, &["status", "severity"]) {
        parts.push(format!("[{}]", status));
    }
    if let Some(message) = str_field(item, &["message", "description", "reason"]) {
        parts.push(message.to_string());
    }
    if parts.is_empty() {
        item.to_string()
    } else {
        parts.join(" ")
    }
}

fn list_item(item: &Value) -> String {
    let Value::Object(map) = item else {
        return format_value(item);
    };

    if let Some(name) = str_field(item, &["name", "filesetName", "filesystemName", "snapshotName"]) {
        return match str_field(item, &["status", "state"]) {
            Some(status) => format!("`{}` ({})", name, status),
            None => format!("`{}`", name),
        };
    }

    map.iter()
        .take(4)
        .map(|(k, v)| format!("{}={}", k, format_value(v)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_map(map: &Map<String, Value>, indent: usize) -> String {
    let prefix = "  ".repeat(indent);
    let mut lines = Vec::new();
    for (key, value) in map {
        match value {
            Value::Object(inner) => {
                lines.push(format!("{}**{}:**", prefix, key));
                lines.push(format_map(inner, indent + 1));
            }
            Value::Array(items) => {
                lines.push(format!("{}**{}:** ({} items)", prefix, key, items.len()));
                if items.len() <= 5 {
                    for item in items {
                        lines.push(format!("{}  • {}", prefix, format_value(item)));
                    }
                }
            }
            other => lines.push(format!("{}**{}:** {}", prefix, key, format_value(other))),
        }
    }
    lines.join("\n")
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "*none*".to_string(),
        Value::Bool(true) => "✓".to_string(),
        Value::Bool(false) => "✗".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) if s.chars().count() > MAX_VALUE_LEN => {
            let head: String = s.chars().take(MAX_VALUE_LEN - 3).collect();
            format!("{}...", head)
        }
        Value::String(s) => s.clone(),
        Value::Array(items) => format!("[{} items]", items.len()),
        Value::Object(map) => format!("{{{} fields}}", map.len()),
    }
}
