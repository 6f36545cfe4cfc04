// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Human/JSON output rendering. JSON output is always tagged with a
//! `schema` field of the form `brewva.gateway.<command>.v1` (spec §6.1).

use clap::ValueEnum;
use serde_json::Value;

#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Print `payload` tagged with `schema`. In JSON mode, `schema` is spliced
/// into the object; in text mode, the caller-supplied `render` closure
/// formats the same payload for a human.
pub fn emit(format: OutputFormat, schema: &str, mut payload: Value, render: impl FnOnce(&Value)) {
    match format {
        OutputFormat::Json => {
            if let Value::Object(map) = &mut payload {
                map.insert("schema".to_string(), Value::String(schema.to_string()));
            }
            println!("{}", serde_json::to_string_pretty(&payload).unwrap_or_default());
        }
        OutputFormat::Text => render(&payload),
    }
}

pub fn emit_error(format: OutputFormat, schema: &str, message: &str) {
    match format {
        OutputFormat::Json => {
            let payload = serde_json::json!({ "schema": schema, "error": message });
            println!("{}", serde_json::to_string_pretty(&payload).unwrap_or_default());
        }
        OutputFormat::Text => eprintln!("error: {message}"),
    }
}
