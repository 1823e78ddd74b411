// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// HTTP Status Reporter
//
// Pushes job status changes to an external job service:
//   POST {endpoint}/jobs/{job_id}/status  {"status": "...", "extra": {...}}
//
// Best-effort. Transport errors and non-2xx answers are logged and dropped;
// an agent never fails because the job service is down.

use crate::domain::collaborators::StatusReporter;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Serialize)]
struct StatusPayload<'a> {
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    extra: Option<serde_json::Value>,
}

pub struct HttpStatusReporter {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpStatusReporter {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl StatusReporter for HttpStatusReporter {
    async fn report_status(&self, job_id: &str, status: &str, extra: Option<serde_json::Value>) {
        let url = format!("{}/jobs/{}/status", self.endpoint, job_id);
        let result = self
            .client
            .post(&url)
            .json(&StatusPayload { status, extra })
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!(job_id, status, "Job status reported");
            }
            Ok(response) => {
                metrics::counter!("research_hub_status_report_failures_total").increment(1);
                warn!(job_id, status, http_status = %response.status(), "Status endpoint rejected report");
            }
            Err(e) => {
                metrics::counter!("research_hub_status_report_failures_total").increment(1);
                warn!(job_id, status, error = %e, "Failed to reach status endpoint");
            }
        }
    }
}
