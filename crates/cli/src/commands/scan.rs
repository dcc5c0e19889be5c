use chrono::Utc;

use crate::commands::CommandResult;
use tripflow_core::config::{AppConfig, LoadOptions};
use tripflow_db::connect_with_settings;
use tripflow_engine::AutomationEngine;

pub fn run(rule: Option<String>, threshold: Option<i64>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "scan",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "scan",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        let engine = AutomationEngine::new(pool.clone(), config.automation);
        let now = Utc::now();
        let output = match rule {
            Some(rule) => {
                let outcome = engine
                    .run_rule(&rule, threshold, now)
                    .await
                    .map_err(|error| ("scan", error.to_string(), 5u8))?;
                serde_json::to_string(&outcome)
                    .map_err(|error| ("serialization", error.to_string(), 6u8))?
            }
            None => {
                let summary = engine.run_all(now).await;
                serde_json::to_string(&summary)
                    .map_err(|error| ("serialization", error.to_string(), 6u8))?
            }
        };
        pool.close().await;
        Ok::<String, (&'static str, String, u8)>(output)
    });

    match result {
        Ok(output) => CommandResult { exit_code: 0, output },
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("scan", error_class, message, exit_code)
        }
    }
}
