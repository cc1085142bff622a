use anyhow::Context;
use tracing::{error, info};

use multidb::{Config, DatabaseConnector};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let connector = DatabaseConnector::new();
    let registered = connector.register_from_config(&config).await;
    info!(
        "Registered {} of {} configured connections",
        registered,
        config.connections.len()
    );

    let args: Vec<String> = std::env::args().skip(1).collect();
    let outcome = run(&connector, &args).await;

    connector.close_all_connections().await;
    outcome
}

async fn run(connector: &DatabaseConnector, args: &[String]) -> anyhow::Result<()> {
    match args {
        [] => {
            let mut names = connector.connection_names().await;
            names.sort();
            for name in names {
                println!("{}", name);
            }
            Ok(())
        }
        [name] => {
            let schema = connector
                .get_schema_information(name)
                .await
                .with_context(|| format!("no schema available for {}", name))?;
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(())
        }
        [name, sql] => {
            let output = connector.execute_query(name, sql).await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        _ => anyhow::bail!("usage: multidb [CONNECTION [SQL]]"),
    }
}
