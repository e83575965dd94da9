use std::fmt::Write as _;

use chrono::Utc;
use colored::Colorize;
use logmode_core::{BoxError, Field, Serializer, Value, Writer};

/// `key=value` pairs separated by spaces, one record per line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogfmtSerializer;

fn logfmt_key(key: &str) -> String {
    let key: String = key
        .chars()
        .map(|c| if c.is_whitespace() || c == '=' || c == '"' { '_' } else { c })
        .collect();
    if key.is_empty() { "_".into() } else { key }
}

fn logfmt_value(out: &mut String, value: &Value) {
    let raw = value.to_string();
    let needs_quotes = raw.is_empty()
        || raw
            .chars()
            .any(|c| c.is_whitespace() || c == '=' || c == '"' || c.is_control());
    if !needs_quotes {
        out.push_str(&raw);
        return;
    }
    out.push('"');
    for c in raw.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{{{:04x}}}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

impl Serializer for LogfmtSerializer {
    fn serialize(&self, writer: &dyn Writer, fields: &[Field]) -> Result<(), BoxError> {
        let mut line = String::new();
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                line.push(' ');
            }
            line.push_str(&logfmt_key(&field.key));
            line.push('=');
            logfmt_value(&mut line, &field.value);
        }
        line.push('\n');
        writer.write_record(line.as_bytes())?;
        Ok(())
    }
}

/// One JSON object per line, keys in record order. A repeated key keeps its
/// last value.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

fn json_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(v) => (*v).into(),
        Value::Int(v) => (*v).into(),
        Value::UInt(v) => (*v).into(),
        Value::Float(v) => serde_json::Number::from_f64(*v)
            .map_or_else(|| v.to_string().into(), serde_json::Value::Number),
        Value::Str(v) => v.as_str().into(),
    }
}

impl Serializer for JsonSerializer {
    fn serialize(&self, writer: &dyn Writer, fields: &[Field]) -> Result<(), BoxError> {
        let object: serde_json::Map<String, serde_json::Value> = fields
            .iter()
            .map(|f| (f.key.clone(), json_value(&f.value)))
            .collect();
        let mut buf = serde_json::to_vec(&object)?;
        buf.push(b'\n');
        writer.write_record(&buf)?;
        Ok(())
    }
}

/// Human readable line, `[time LEVEL] msg key=value ...`, with a coloured
/// level tag. Takes the time from a `ts` entry when a filter added one.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSerializer;

fn level_tag(level: &str) -> colored::ColoredString {
    match level {
        "ERROR" => level.red(),
        "WARN" => level.yellow(),
        "INFO" => level.green(),
        "DEBUG" => level.blue(),
        "AUDIT" => level.purple(),
        other => other.normal(),
    }
}

impl Serializer for ConsoleSerializer {
    fn serialize(&self, writer: &dyn Writer, fields: &[Field]) -> Result<(), BoxError> {
        let lookup = |key: &str| {
            fields
                .iter()
                .find(|f| f.key == key)
                .map(|f| f.value.to_string())
        };
        let time = lookup("ts")
            .unwrap_or_else(|| Utc::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string());
        let mut line = match lookup("level") {
            Some(level) => format!("[{time} {}]", level_tag(&level)),
            None => format!("[{time}]"),
        };
        if let Some(msg) = lookup("msg") {
            line.push(' ');
            line.push_str(&msg);
        }
        for field in fields
            .iter()
            .filter(|f| !matches!(f.key.as_str(), "ts" | "level" | "msg"))
        {
            line.push(' ');
            line.push_str(&logfmt_key(&field.key));
            line.push('=');
            logfmt_value(&mut line, &field.value);
        }
        line.push('\n');
        writer.write_record(line.as_bytes())?;
        Ok(())
    }
}
