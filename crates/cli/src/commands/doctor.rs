use serde::Serialize;
use serde_json::json;

use crate::commands::CommandResult;
use tripflow_core::config::{AppConfig, LoadOptions};
use tripflow_db::connect_with_settings;

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: &'static str,
    detail: String,
}

pub fn run(json_output: bool) -> CommandResult {
    let mut checks = Vec::new();

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config",
                status: "ok",
                detail: "configuration loaded and validated".to_string(),
            });
            Some(config)
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config",
                status: "error",
                detail: error.to_string(),
            });
            None
        }
    };

    if let Some(config) = &config {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build();
        match runtime {
            Ok(runtime) => {
                let detail = runtime.block_on(async {
                    match connect_with_settings(
                        &config.database.url,
                        config.database.max_connections,
                        config.database.timeout_secs,
                    )
                    .await
                    {
                        Ok(pool) => {
                            let ping =
                                sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(&pool).await;
                            pool.close().await;
                            match ping {
                                Ok(_) => ("ok", "database reachable".to_string()),
                                Err(error) => ("error", format!("database ping failed: {error}")),
                            }
                        }
                        Err(error) => ("error", format!("database connection failed: {error}")),
                    }
                });
                checks.push(DoctorCheck { name: "database", status: detail.0, detail: detail.1 });
            }
            Err(error) => {
                checks.push(DoctorCheck {
                    name: "database",
                    status: "error",
                    detail: format!("failed to initialize async runtime: {error}"),
                });
            }
        }
    }

    let healthy = checks.iter().all(|check| check.status == "ok");
    let exit_code = if healthy { 0 } else { 1 };

    let output = if json_output {
        json!({
            "command": "doctor",
            "status": if healthy { "ok" } else { "error" },
            "checks": checks,
        })
        .to_string()
    } else {
        let mut lines = vec![format!("doctor: {}", if healthy { "ok" } else { "error" })];
        for check in &checks {
            lines.push(format!("  [{}] {}: {}", check.status, check.name, check.detail));
        }
        lines.join("\n")
    };

    CommandResult { exit_code, output }
}
