//! Output formatting for rtdb-cli (table, json)

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format, quiet }
    }

    /// Print a success message (unless in quiet mode)
    pub fn success(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg.green());
        }
    }

    /// Print an info message (unless in quiet mode)
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg);
        }
    }

    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
    }

    pub fn error(&self, msg: &str) {
        eprintln!("{}", msg.red());
    }

    /// Print a value read from the store
    ///
    /// In table format the children of an object become one row each.
    pub fn print_value(&self, value: Option<&Value>) {
        match self.format {
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(value.unwrap_or(&Value::Null))
                        .unwrap_or_else(|_| "null".to_string())
                );
            }
            OutputFormat::Table => match value {
                None => {
                    if !self.quiet {
                        println!("No data");
                    }
                }
                Some(Value::Object(children)) => {
                    let rows: Vec<ChildRow> = children
                        .iter()
                        .map(|(key, value)| ChildRow {
                            key: key.clone(),
                            value: format_json_value(value),
                        })
                        .collect();
                    println!("{}", Table::new(rows));
                }
                Some(other) => println!("{}", format_json_value(other)),
            },
        }
    }

    /// Print a single item in the configured format
    pub fn print_one<T: Tabled + Serialize>(&self, data: &T) {
        match self.format {
            OutputFormat::Table => {
                println!("{}", Table::new([data]));
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
    }
}

/// Render a JSON value for a table cell
pub fn format_json_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// One child of an object
#[derive(Debug, Tabled, Serialize)]
pub struct ChildRow {
    #[tabled(rename = "Key")]
    pub key: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

/// Result of a push
#[derive(Debug, Tabled, Serialize)]
pub struct PushRow {
    #[tabled(rename = "Path")]
    pub path: String,
    #[tabled(rename = "Key")]
    pub name: String,
}

/// One change reported by the watch command
#[derive(Debug, Tabled, Serialize)]
pub struct ChangeRow {
    #[tabled(rename = "Change")]
    pub change: String,
    #[tabled(rename = "Key")]
    pub key: String,
    #[tabled(rename = "Value")]
    pub value: String,
}
