//! Watch command - print changes to a path as they happen

use anyhow::Result;
use colored::Colorize;
use rtdb_client::streaming::ChangeEvent;
use rtdb_client::RtdbClient;
use serde_json::Value;

use crate::commands::get::QueryArgs;
use crate::output::{format_json_value, ChangeRow, OutputContext, OutputFormat};

/// Subscribe to `path` and print every change until Ctrl+C
pub async fn watch(
    client: &RtdbClient,
    path: &str,
    args: &QueryArgs,
    ctx: &OutputContext,
) -> Result<()> {
    let query = args.to_query()?;
    let mut subscription = client.subscribe::<Value>(path, query.as_ref())?;

    ctx.info(&format!("Watching {}...", path));
    ctx.info("Press Ctrl+C to stop");

    loop {
        tokio::select! {
            event = subscription.next() => match event {
                Some(ChangeEvent::Fatal(e)) => {
                    ctx.error(&format!("Stream error: {}", e));
                    break;
                }
                Some(ChangeEvent::DecodeFailed(e)) => {
                    ctx.warn(&format!("Skipping {}: {}", e.key, e));
                }
                Some(event) => {
                    if let Some(row) = change_row(event) {
                        print_change(&row, ctx);
                    }
                }
                None => {
                    ctx.info("Stream ended");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                ctx.info("\nStopping subscription...");
                break;
            }
        }
    }

    subscription.cancel();
    subscription.handle().terminated().await;
    ctx.success("Subscription cancelled");
    Ok(())
}

fn change_row(event: ChangeEvent<Value>) -> Option<ChangeRow> {
    let (change, key, value) = match event {
        ChangeEvent::Added { key, value } => ("added", key, format_json_value(&value)),
        ChangeEvent::Changed { key, value } => ("changed", key, format_json_value(&value)),
        ChangeEvent::Removed { key } => ("removed", key, String::new()),
        ChangeEvent::DecodeFailed(_) | ChangeEvent::Fatal(_) => return None,
    };
    Some(ChangeRow {
        change: change.to_string(),
        key,
        value,
    })
}

fn print_change(row: &ChangeRow, ctx: &OutputContext) {
    match ctx.format {
        OutputFormat::Table => {
            let change = match row.change.as_str() {
                "added" => row.change.green(),
                "removed" => row.change.red(),
                _ => row.change.yellow(),
            };
            let key = if row.key.is_empty() { "/" } else { row.key.as_str() };
            if row.value.is_empty() {
                println!("{} {}", change, key.bold());
            } else {
                println!("{} {} = {}", change, key.bold(), row.value);
            }
        }
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string(row) {
                println!("{}", json);
            }
        }
    }
}
