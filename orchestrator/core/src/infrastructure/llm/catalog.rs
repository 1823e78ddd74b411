// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Decision Model Catalog - Named model resolution
//
// Builds one adapter per configured endpoint and resolves the `model` param
// of research agents to it. Calls are retried with exponential backoff on
// network and rate-limit errors.

use crate::domain::llm::{Decision, DecisionModel, DecisionRequest, ModelError};
use crate::domain::node_config::ModelEndpointConfig;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::openai::OpenAIDecisionModel;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY_MS: u64 = 500;

#[derive(Clone, Default)]
pub struct ModelCatalog {
    models: HashMap<String, Arc<dyn DecisionModel>>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(endpoints: &[ModelEndpointConfig]) -> anyhow::Result<Self> {
        let mut catalog = Self::new();
        for endpoint in endpoints {
            let api_key = Self::resolve_api_key(&endpoint.api_key)?;
            info!(
                "Registering decision model '{}' -> {} ({})",
                endpoint.name, endpoint.model, endpoint.endpoint
            );
            let model = OpenAIDecisionModel::new(endpoint.endpoint.clone(), api_key, endpoint.model.clone())
                .with_temperature(endpoint.temperature)
                .with_timeout(Duration::from_secs(endpoint.timeout_secs));
            catalog.register(endpoint.name.clone(), Arc::new(Retrying::new(Arc::new(model))));
        }
        Ok(catalog)
    }

    /// Resolve API key from config (supports "env:VAR_NAME" syntax)
    fn resolve_api_key(key: &Option<String>) -> anyhow::Result<String> {
        match key.as_deref() {
            Some(k) => match k.strip_prefix("env:") {
                Some(var_name) => std::env::var(var_name)
                    .map_err(|_| anyhow::anyhow!("Environment variable not set: {}", var_name)),
                None => Ok(k.to_string()),
            },
            None => Ok(String::new()),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, model: Arc<dyn DecisionModel>) {
        self.models.insert(name.into(), model);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DecisionModel>> {
        self.models.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.models.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Retries transient failures of the wrapped model.
struct Retrying {
    inner: Arc<dyn DecisionModel>,
}

impl Retrying {
    fn new(inner: Arc<dyn DecisionModel>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl DecisionModel for Retrying {
    async fn decide(&self, request: &DecisionRequest) -> Result<Decision, ModelError> {
        let mut attempt = 0;
        loop {
            match self.inner.decide(request).await {
                Ok(decision) => return Ok(decision),
                Err(e @ (ModelError::Network(_) | ModelError::RateLimit)) if attempt + 1 < MAX_ATTEMPTS => {
                    warn!(
                        "Decision failed (attempt {}/{}): {}",
                        attempt + 1,
                        MAX_ATTEMPTS,
                        e
                    );
                    tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * 2_u64.pow(attempt))).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn name(&self) -> String {
        self.inner.name()
    }
}
