//! Inspect command implementation.

use serde::Serialize;
use std::path::Path;
use todosync_protocol::Record;
use todosync_store::{FileStore, RecordStore};
use tracing::info;

/// Replica inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// State file path.
    pub path: String,
    /// Number of records.
    pub record_count: usize,
    /// Number of completed records.
    pub completed_count: usize,
    /// All records, ordered by key.
    pub records: Vec<Record>,
}

impl InspectResult {
    fn new(path: &Path, records: Vec<Record>) -> Self {
        Self {
            path: path.display().to_string(),
            record_count: records.len(),
            completed_count: records.iter().filter(|r| r.completed).count(),
            records,
        }
    }
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    info!("Inspecting replica state {:?}", path);

    if !path.exists() {
        return Err(format!("No replica state found at {:?}", path).into());
    }

    let store = FileStore::open(path)?;
    let result = InspectResult::new(path, store.list()?);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print!("{}", render_text(&result));
        }
    }

    Ok(())
}

fn render_text(result: &InspectResult) -> String {
    let mut out = String::new();
    out.push_str(&format!("Replica: {}\n", result.path));
    out.push_str(&format!(
        "Records: {} ({} completed)\n",
        result.record_count, result.completed_count
    ));

    for record in &result.records {
        let mark = if record.completed { 'x' } else { ' ' };
        out.push_str(&format!(
            "  [{mark}] {} {}  updated {}\n",
            record.key(),
            record.title,
            record.updated_at.to_rfc3339()
        ));
        if let Some(description) = &record.description {
            out.push_str(&format!("        {description}\n"));
        }
    }
    out
}
