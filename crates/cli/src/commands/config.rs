use serde_json::json;

use tripflow_core::config::{AppConfig, LoadOptions, LogFormat};

pub fn run() -> String {
    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            let payload = json!({
                "database": {
                    "url": config.database.url,
                    "max_connections": config.database.max_connections,
                    "timeout_secs": config.database.timeout_secs,
                },
                "server": {
                    "bind_address": config.server.bind_address,
                    "port": config.server.port,
                    "graceful_shutdown_secs": config.server.graceful_shutdown_secs,
                },
                "automation": {
                    "quote_followup_days": config.automation.quote_followup_days,
                    "task_reminder_days": config.automation.task_reminder_days,
                    "feedback_days": config.automation.feedback_days,
                    "commission_days": config.automation.commission_days,
                    "payment_deadline_hours": config.automation.payment_deadline_hours,
                    "travel_readiness_hours": config.automation.travel_readiness_hours,
                    "deadline_task_lead_days": config.automation.deadline_task_lead_days,
                },
                "idempotency": {
                    "ttl_secs": config.idempotency.ttl_secs,
                    "sweep_interval_secs": config.idempotency.sweep_interval_secs,
                },
                "logging": {
                    "level": config.logging.level,
                    "format": match config.logging.format {
                        LogFormat::Compact => "compact",
                        LogFormat::Pretty => "pretty",
                        LogFormat::Json => "json",
                    },
                },
            });
            serde_json::to_string_pretty(&payload)
                .unwrap_or_else(|error| format!("{{\"error\":\"{error}\"}}"))
        }
        Err(error) => {
            json!({ "status": "error", "error_class": "config_validation", "message": error.to_string() })
                .to_string()
        }
    }
}
