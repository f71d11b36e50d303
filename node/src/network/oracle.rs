// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use plumise_agent_kernel::report::SignedReport;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::errors::AgentError;

pub const REPORT_PATH: &str = "/api/v1/report";
pub const REPORT_ID_HEADER: &str = "X-Report-Id";

/// HTTP client for the Oracle's report endpoint.
#[derive(Debug, Clone)]
pub struct OracleClient {
    base_url: String,
    client: Client,
}

impl OracleClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            base_url: url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// One delivery attempt. 2xx with a body that is not `{"status":"error"}` counts as accepted.
    pub async fn submit_report(&self, report: &SignedReport) -> Result<(), AgentError> {
        let url = format!("{}{}", self.base_url, REPORT_PATH);
        let report_id = report.report_id()?;

        let resp = self
            .client
            .post(&url)
            .header(REPORT_ID_HEADER, report_id)
            .json(report)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(AgentError::Oracle {
                status: status.as_u16(),
                message: truncate(&text),
            });
        }

        if let Ok(body) = serde_json::from_str::<Value>(&text) {
            if body.get("status").and_then(Value::as_str) == Some("error") {
                let message = body
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("oracle reported an error")
                    .to_string();
                return Err(AgentError::Oracle {
                    status: status.as_u16(),
                    message,
                });
            }
        }

        Ok(())
    }
}

fn truncate(s: &str) -> String {
    s.chars().take(200).collect()
}
