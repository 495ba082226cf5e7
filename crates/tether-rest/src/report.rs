use serde::Serialize;
use serde_json::Value;
use tether_core::{Environment, Session};

/// Everything known about a crashed request.
#[derive(Debug, Clone, Serialize)]
pub struct CrashReport {
    pub service: String,
    pub method: String,
    pub path: String,
    pub environment: Environment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
    pub traceback: String,
}

/// Receives crash reports, e.g. to notify developers.
pub trait ErrorReporter: Send + Sync {
    /// Returns false when the report could not be delivered.
    fn report(&self, report: &CrashReport) -> bool;
}

/// Writes reports to the log as one event with titled sections.
#[derive(Debug, Clone, Default)]
pub struct LogReporter {
    enabled: bool,
}

impl LogReporter {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn render(report: &CrashReport) -> String {
        let mut sections = vec![
            format!("ERROR MESSAGE\n\n{}\n", report.traceback),
            format!("REQUEST\n\n{} {}:{}\n", report.method, report.service, report.path),
            format!(
                "BODY\n\n{}\n",
                report.data.as_ref().map_or_else(|| "None".to_string(), pretty)
            ),
        ];
        if let Some(session) = &report.session {
            sections.push(format!("SESSION\n\n{}\n", pretty(session)));
        }
        sections.push(format!("ENVIRONMENT\n\n{}\n", pretty(&report.environment)));
        sections.join("\n")
    }
}

impl ErrorReporter for LogReporter {
    fn report(&self, report: &CrashReport) -> bool {
        if !self.enabled {
            return true;
        }
        tracing::error!(
            target: "tether::report",
            service = %report.service,
            path = %report.path,
            "{}",
            Self::render(report)
        );
        true
    }
}

fn pretty<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("<unprintable: {e}>"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report() -> CrashReport {
        CrashReport {
            service: "shop".into(),
            method: "POST".into(),
            path: "/order".into(),
            environment: Environment {
                method: "POST".into(),
                path: "/order".into(),
                ..Environment::default()
            },
            data: Some(json!({"sku": "a-1"})),
            session: None,
            traceback: "boom".into(),
        }
    }

    #[test]
    fn render_has_sections_in_order() {
        let text = LogReporter::render(&report());
        let error = text.find("ERROR MESSAGE").unwrap();
        let request = text.find("REQUEST\n\nPOST shop:/order").unwrap();
        let body = text.find("BODY").unwrap();
        let env = text.find("ENVIRONMENT").unwrap();
        assert!(error < request && request < body && body < env);
        assert!(text.contains("\"sku\": \"a-1\""));
        assert!(!text.contains("SESSION"));
    }

    #[test]
    fn disabled_reporter_still_acknowledges() {
        assert!(LogReporter::new(false).report(&report()));
        assert!(LogReporter::new(true).report(&report()));
    }
}
