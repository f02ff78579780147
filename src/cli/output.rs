//! Output formatting utilities for the CLI.

use comfy_table::{presets, Cell, CellAlignment, ContentArrangement, Table};
use serde::Serialize;
use serde_json::{json, Value};

use crate::mcclient::{ListResult, SubmitResult};

const LIST_CELL_WIDTH: usize = 48;

pub trait CommandOutput: Serialize {
    fn to_human(&self) -> String;
    fn to_json(&self) -> Value;
}

pub fn output<T: CommandOutput>(result: &T, json_mode: bool) {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&result.to_json()).unwrap_or_default());
    } else {
        println!("{}", result.to_human());
    }
}

/// What a climc command produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CommandResult {
    Object(Value),
    List(ListResult),
    Batch(Vec<SubmitResult>),
}

impl CommandResult {
    /// Batch elements that did not succeed.
    pub fn failures(&self) -> usize {
        match self {
            CommandResult::Batch(results) => results.iter().filter(|r| !r.is_success()).count(),
            _ => 0,
        }
    }
}

impl CommandOutput for CommandResult {
    fn to_human(&self) -> String {
        match self {
            CommandResult::Object(value) => render_object(value),
            CommandResult::List(list) => render_list(list),
            CommandResult::Batch(results) => render_batch_results(results),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            CommandResult::Object(value) => value.clone(),
            CommandResult::List(list) => json!({
                "data": list.data,
                "total": list.total,
                "limit": list.limit,
                "offset": list.offset,
            }),
            CommandResult::Batch(results) => serde_json::to_value(results).unwrap_or_default(),
        }
    }
}

pub fn print_object(value: &Value, json_mode: bool) {
    output(&CommandResult::Object(value.clone()), json_mode);
}

pub fn print_list(list: &ListResult, json_mode: bool) {
    output(&CommandResult::List(list.clone()), json_mode);
}

pub fn print_batch_results(results: &[SubmitResult], json_mode: bool) {
    output(&CommandResult::Batch(results.to_vec()), json_mode);
}

/// Truncate a string to a maximum length, appending "..." if truncated.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn list_table(headers: &[String]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h.to_uppercase()).set_alignment(CellAlignment::Left)),
        );
    table
}

/// Key/value table of one object; non-objects print as JSON.
pub fn render_object(value: &Value) -> String {
    let Value::Object(map) = value else {
        return serde_json::to_string_pretty(value).unwrap_or_default();
    };
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Field", "Value"]);
    for (key, v) in map {
        table.add_row(vec![key.clone(), cell_text(v)]);
    }
    table.to_string()
}

/// Columns are the keys of every row in first-seen order, `id` and `name` first.
fn list_columns(rows: &[Value]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for key in ["id", "name"] {
        if rows.iter().any(|r| r.get(key).is_some()) {
            columns.push(key.to_string());
        }
    }
    for row in rows {
        if let Value::Object(map) = row {
            for key in map.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
    }
    columns
}

pub fn render_list(list: &ListResult) -> String {
    let footer = if list.limit > 0 {
        format!("Total: {} (limit {}, offset {})", list.total, list.limit, list.offset)
    } else {
        format!("Total: {}", list.total)
    };
    if list.data.is_empty() {
        return footer;
    }

    let columns = list_columns(&list.data);
    let mut table = list_table(&columns);
    for row in &list.data {
        table.add_row(
            columns
                .iter()
                .map(|c| truncate(&row.get(c).map(cell_text).unwrap_or_default(), LIST_CELL_WIDTH)),
        );
    }
    format!("{table}\n{footer}")
}

pub fn render_batch_results(results: &[SubmitResult]) -> String {
    let headers = ["id", "status", "result"].map(str::to_string);
    let mut table = list_table(&headers);
    for r in results {
        let detail = if r.is_success() {
            r.data
                .get("status")
                .or_else(|| r.data.get("name"))
                .map_or_else(|| "ok".to_string(), cell_text)
        } else {
            r.data
                .get("details")
                .map_or_else(|| cell_text(&r.data), cell_text)
        };
        table.add_row(vec![r.id.clone(), r.status.to_string(), truncate(&detail, 80)]);
    }
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a long value here", 10), "a long ...");
    }

    #[test]
    fn test_render_object() {
        let text = render_object(&json!({"id": "a1", "enabled": true, "settings": {"level": "fatal"}}));
        assert!(text.contains("a1"));
        assert!(text.contains("true"));
        assert!(text.contains(r#"{"level":"fatal"}"#));

        assert_eq!(render_object(&Value::Null), "null");
    }

    #[test]
    fn test_render_list_columns_and_total() {
        let list = ListResult {
            data: vec![
                json!({"status": "ready", "name": "cpu-high", "id": "a1"}),
                json!({"id": "a2", "name": "mem-high", "level": "important"}),
            ],
            total: 2,
            limit: 20,
            offset: 0,
        };
        assert_eq!(list_columns(&list.data), vec!["id", "name", "status", "level"]);

        let text = render_list(&list);
        assert!(text.contains("ID"));
        assert!(text.contains("mem-high"));
        assert!(text.ends_with("Total: 2 (limit 20, offset 0)"));

        assert_eq!(render_list(&ListResult::default()), "Total: 0");
    }

    #[test]
    fn test_batch_results_and_failures() {
        let results = vec![
            SubmitResult {
                id: "a1".into(),
                status: 200,
                data: json!({"id": "a1", "status": "deleted"}),
            },
            SubmitResult {
                id: "a2".into(),
                status: 404,
                data: json!({"code": 404, "class": "ResourceNotFoundError", "details": "alert a2 not found"}),
            },
        ];
        let text = render_batch_results(&results);
        assert!(text.contains("deleted"));
        assert!(text.contains("alert a2 not found"));
        assert_eq!(CommandResult::Batch(results).failures(), 1);
    }

    #[test]
    fn test_json_list_shape() {
        let list = CommandResult::List(ListResult {
            data: vec![json!({"id": "r1"})],
            total: 1,
            limit: 0,
            offset: 0,
        });
        assert_eq!(list.to_json()["data"][0]["id"], "r1");
        assert_eq!(list.to_json()["total"], 1);
    }
}
