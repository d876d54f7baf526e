use serde::Serialize;
use sitelens_agent::AgentRuntime;
use sitelens_core::config::{AppConfig, LoadOptions};

use super::CommandResult;

const EXIT_CHECK_FAILED: u8 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str) -> Self {
        Self {
            name,
            status: CheckStatus::Skipped,
            details: "skipped because configuration did not load".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report(AppConfig::load(LoadOptions::default()).map_err(|error| error.to_string()));
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { EXIT_CHECK_FAILED };

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult { exit_code, output };
    }

    CommandResult { exit_code, output: render_human(&report) }
}

fn build_report(config: Result<AppConfig, String>) -> DoctorReport {
    let mut checks = Vec::new();

    match config {
        Ok(config) => {
            checks.push(DoctorCheck::pass("config_validation", "configuration loaded and validated"));
            checks.push(check_llm_credentials(&config));
            checks.push(check_analytics_credentials(&config));
            checks.push(check_dataset_source(&config));
            checks.push(check_runtime_setup(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error));
            for name in ["llm_credentials", "analytics_credentials", "dataset_source", "runtime_setup"] {
                checks.push(DoctorCheck::skipped(name));
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_llm_credentials(config: &AppConfig) -> DoctorCheck {
    if config.has_llm_credentials() {
        DoctorCheck::pass(
            "llm_credentials",
            format!("api key set for model `{}` at {}", config.llm.model, config.llm.base_url),
        )
    } else {
        DoctorCheck::fail("llm_credentials", "llm.api_key is not set (SITELENS_LLM_API_KEY)")
    }
}

fn check_analytics_credentials(config: &AppConfig) -> DoctorCheck {
    if !config.has_analytics_credentials() {
        return DoctorCheck::fail(
            "analytics_credentials",
            "analytics.access_token is not set (SITELENS_ANALYTICS_ACCESS_TOKEN); analytics and fusion queries will fail",
        );
    }

    let details = if config.analytics.demo_mode {
        "access token set; empty reports are replaced with demo rows"
    } else {
        "access token set"
    };
    DoctorCheck::pass("analytics_credentials", details)
}

fn check_dataset_source(config: &AppConfig) -> DoctorCheck {
    match &config.dataset.csv_url {
        Some(url) => DoctorCheck::pass("dataset_source", format!("crawl export at {url}")),
        None => DoctorCheck::fail(
            "dataset_source",
            "dataset.csv_url is not set (SITELENS_DATASET_CSV_URL); seo queries will fail",
        ),
    }
}

fn check_runtime_setup(config: &AppConfig) -> DoctorCheck {
    match AgentRuntime::from_config(config) {
        Ok(_) => DoctorCheck::pass("runtime_setup", "http clients constructed"),
        Err(error) => DoctorCheck::fail("runtime_setup", error.to_string()),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use sitelens_core::config::{AppConfig, ConfigOverrides, LoadOptions};

    use super::{build_report, render_human, CheckStatus};

    fn config(overrides: ConfigOverrides) -> AppConfig {
        AppConfig::load(LoadOptions {
            config_path: Some("does-not-exist.toml".into()),
            overrides,
            ..LoadOptions::default()
        })
        .expect("config should load")
    }

    #[test]
    fn fully_configured_runtime_passes_every_check() {
        let report = build_report(Ok(config(ConfigOverrides {
            llm_api_key: Some("sk-test".to_string()),
            analytics_access_token: Some("ya29.test".to_string()),
            dataset_csv_url: Some("https://example.com/export?format=csv".to_string()),
            ..ConfigOverrides::default()
        })));

        assert_eq!(report.overall_status, CheckStatus::Pass);
        assert!(report.checks.iter().all(|check| check.status == CheckStatus::Pass));
    }

    #[test]
    fn missing_dataset_url_fails_only_that_check() {
        let report = build_report(Ok(config(ConfigOverrides {
            llm_api_key: Some("sk-test".to_string()),
            analytics_access_token: Some("ya29.test".to_string()),
            ..ConfigOverrides::default()
        })));

        assert_eq!(report.overall_status, CheckStatus::Fail);
        let failed: Vec<_> = report
            .checks
            .iter()
            .filter(|check| check.status == CheckStatus::Fail)
            .map(|check| check.name)
            .collect();
        assert_eq!(failed, vec!["dataset_source"]);
    }

    #[test]
    fn config_failure_skips_remaining_checks() {
        let report = build_report(Err("configuration validation failed: bad".to_string()));
        let rendered = render_human(&report);

        assert_eq!(report.checks.len(), 5);
        assert!(rendered.contains("- [fail] config_validation: configuration validation failed: bad"));
        assert!(rendered.contains("- [skip] runtime_setup"));
    }
}
