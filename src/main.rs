//! Prints a JSON report of a task hub snapshot.
//!
//! ```text
//! taskhub-inspect <sqlite-url>                      # every hub with its status counts
//! taskhub-inspect <sqlite-url> <hub>                # one hub: resources, queues, failures
//! taskhub-inspect <sqlite-url> <hub> <instance-id>  # one instance with its history
//! ```
//!
//! Logging goes to stderr; `RUST_LOG` overrides `--log-level`.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use taskhub_inspect::history;
use taskhub_inspect::observability::{LogFormat, ObservabilityConfig, init_logging};
use taskhub_inspect::providers::sqlite::SqliteStore;
use taskhub_inspect::{Inspector, InspectorOptions};
use tokio_util::sync::CancellationToken;

/// Read-only report of the task hubs in a SQLite snapshot.
#[derive(Parser, Debug)]
#[command(name = "taskhub-inspect", version, about, long_about = None)]
struct Cli {
    /// Snapshot to open, e.g. `sqlite:./hub.db`.
    url: String,

    /// Report on this task hub only.
    hub: Option<String>,

    /// Report on this instance of `hub`, including its history.
    #[arg(requires = "hub")]
    instance_id: Option<String>,

    /// Log output format: json, pretty, or compact.
    #[arg(long, env = "LOG_FORMAT", default_value = "compact", value_parser = parse_log_format)]
    log_format: LogFormat,

    /// Level for this crate's log targets.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Failed instances listed in a single-hub report.
    #[arg(long, default_value_t = 20)]
    failed_limit: usize,
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    LogFormat::parse(value).ok_or_else(|| format!("unknown log format '{value}'"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ObservabilityConfig {
        log_format: cli.log_format.clone(),
        log_level: cli.log_level.clone(),
    };
    init_logging(&config).map_err(anyhow::Error::msg)?;

    let url = &cli.url;
    let store = SqliteStore::new(url)
        .await
        .with_context(|| format!("opening snapshot {url}"))?;

    // Ctrl-C cancels whatever is in flight
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let inspector = Inspector::from_store(Arc::new(store))
        .with_options(InspectorOptions::default())
        .with_cancellation(cancel);

    let report = match (cli.hub.as_deref(), cli.instance_id.as_deref()) {
        (None, _) => {
            let mut hubs = Vec::new();
            for namespace in inspector.discover_namespaces().await? {
                let summary = inspector.summarize_namespace(&namespace.name).await?;
                hubs.push(json!({ "namespace": namespace, "summary": summary }));
            }
            json!({ "task_hubs": hubs })
        }
        (Some(hub), None) => {
            let namespace = inspector.describe_namespace(hub).await?;
            if !namespace.exists() {
                anyhow::bail!("task hub {hub} not found");
            }
            json!({
                "namespace": namespace,
                "summary": inspector.summarize_namespace(hub).await?,
                "queues": inspector.queue_depths(hub).await?,
                "failed": inspector
                    .failed_orchestrations_with_reasons(hub, Some(cli.failed_limit))
                    .await?,
            })
        }
        (Some(hub), Some(instance_id)) => {
            let Some(instance) = inspector.get_instance(hub, instance_id).await? else {
                anyhow::bail!("instance {instance_id} not found in task hub {hub}");
            };
            let events = inspector.get_history(hub, instance_id, None).await?;
            json!({
                "instance": instance,
                "summary": history::summarize(instance_id, &events),
                "failures": history::correlate_failures(&events),
                "activities": history::correlate_activities(&events),
                "history": events,
            })
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_positionals_and_log_format() {
        let args = ["taskhub-inspect", "sqlite:hub.db", "Shop", "order-001", "--log-format", "JSON"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.url, "sqlite:hub.db");
        assert_eq!(cli.hub.as_deref(), Some("Shop"));
        assert_eq!(cli.instance_id.as_deref(), Some("order-001"));
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.failed_limit, 20);
    }

    #[test]
    fn rejects_unknown_log_format_and_missing_url() {
        assert!(Cli::try_parse_from(["taskhub-inspect", "sqlite:hub.db", "--log-format", "xml"]).is_err());
        assert!(Cli::try_parse_from(["taskhub-inspect"]).is_err());
    }
}
