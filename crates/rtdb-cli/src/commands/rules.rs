//! Rules command - read or replace the security rules document

use anyhow::{Context, Result};
use clap::Subcommand;
use rtdb_client::{DatabaseRules, RtdbClient};
use std::path::PathBuf;

use crate::output::OutputContext;

#[derive(Debug, Subcommand)]
pub enum RulesAction {
    /// Print the current rules
    Get,

    /// Replace the rules with the contents of a JSON file
    Set {
        /// File holding either `{"rules": {...}}` or the bare rules object
        file: PathBuf,
    },
}

pub async fn rules(client: &RtdbClient, action: &RulesAction, ctx: &OutputContext) -> Result<()> {
    match action {
        RulesAction::Get => {
            let rules = client
                .get_database_rules()
                .await
                .context("Failed to read database rules")?;
            ctx.print_value(Some(&rules.rules));
        }
        RulesAction::Set { file } => {
            let content = std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read rules file: {}", file.display()))?;
            let rules = parse_rules(&content)
                .with_context(|| format!("Failed to parse rules file: {}", file.display()))?;
            client
                .set_database_rules(&rules)
                .await
                .context("Failed to write database rules")?;
            ctx.success("Rules updated");
        }
    }
    Ok(())
}

fn parse_rules(content: &str) -> Result<DatabaseRules> {
    let mut document: serde_json::Value = serde_json::from_str(content)?;
    let rules = match document.get_mut("rules") {
        Some(rules) => rules.take(),
        None => document,
    };
    Ok(DatabaseRules::new(rules))
}
