//! Get command - read a path, optionally filtered

use anyhow::{Context, Result};
use clap::Args;
use rtdb_client::{QueryBuilder, RtdbClient};
use serde_json::Value;

use crate::commands::write::parse_value;
use crate::output::OutputContext;

/// Filtering and ordering options shared by `get` and `watch`
#[derive(Debug, Clone, Default, Args)]
pub struct QueryArgs {
    /// Child key, `$key`, `$value` or `$priority` to order by
    #[arg(long)]
    pub order_by: Option<String>,

    /// Lower bound on the ordered value
    #[arg(long)]
    pub start_at: Option<String>,

    /// Upper bound on the ordered value
    #[arg(long)]
    pub end_at: Option<String>,

    /// Exact match on the ordered value
    #[arg(long)]
    pub equal_to: Option<String>,

    /// Keep only the first N children
    #[arg(long)]
    pub limit_first: Option<u32>,

    /// Keep only the last N children
    #[arg(long)]
    pub limit_last: Option<u32>,

    /// Return only the keys of the children
    #[arg(long)]
    pub shallow: bool,
}

impl QueryArgs {
    /// Build a query, or `None` when no option was given
    pub fn to_query(&self) -> Result<Option<QueryBuilder>> {
        let mut query = QueryBuilder::new();
        if let Some(key) = &self.order_by {
            query = query.order_by(key.as_str());
        }
        if let Some(value) = &self.start_at {
            query = query.start_at(parse_value(value)?);
        }
        if let Some(value) = &self.end_at {
            query = query.end_at(parse_value(value)?);
        }
        if let Some(value) = &self.equal_to {
            query = query.equal_to(parse_value(value)?);
        }
        if let Some(count) = self.limit_first {
            query = query.limit_to_first(count);
        }
        if let Some(count) = self.limit_last {
            query = query.limit_to_last(count);
        }
        if self.shallow {
            query = query.shallow(true);
        }

        Ok((!query.is_empty()).then_some(query))
    }
}

/// Read the value at `path`
pub async fn get(
    client: &RtdbClient,
    path: &str,
    args: &QueryArgs,
    ctx: &OutputContext,
) -> Result<()> {
    let value: Option<Value> = match args.to_query()? {
        Some(query) => client.get_with_query(path, &query).await,
        None => client.get(path).await,
    }
    .with_context(|| format!("Failed to read {}", path))?;

    ctx.print_value(value.as_ref());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_no_options_means_no_query() {
        assert!(QueryArgs::default().to_query().unwrap().is_none());
    }

    #[test]
    fn test_query_from_args() {
        let args = QueryArgs {
            order_by: Some("priority".into()),
            start_at: Some("2".into()),
            limit_first: Some(10),
            ..Default::default()
        };
        let pairs = args.to_query().unwrap().unwrap().to_pairs();
        assert_eq!(
            pairs,
            vec![
                ("orderBy".to_string(), "\"priority\"".to_string()),
                ("startAt".to_string(), "2".to_string()),
                ("limitToFirst".to_string(), "10".to_string()),
            ]
        );
    }
}
