use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{DispatchError, Dispatcher};
use crate::core::hooks::Hook;
use crate::core::hooks::template::{BodyTemplate, TemplateError};
use crate::core::process::ProcessRecord;

/// Sends webhooks over HTTP with one shared client.
pub struct HttpDispatcher {
    client: Client,
    /// Parsed request bodies, keyed by their source text.
    templates: Mutex<HashMap<String, Arc<BodyTemplate>>>,
}

impl HttpDispatcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("dozer/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            templates: Mutex::new(HashMap::new()),
        })
    }

    fn template(&self, source: &str) -> Result<Arc<BodyTemplate>, TemplateError> {
        let mut templates = self.templates.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(template) = templates.get(source) {
            return Ok(template.clone());
        }
        let template = Arc::new(BodyTemplate::parse(source)?);
        templates.insert(source.to_string(), template.clone());
        Ok(template)
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn fire(&self, process: &ProcessRecord, hook: &Hook) -> Result<(), DispatchError> {
        let method = match hook.method.as_str() {
            "GET" => Method::GET,
            "POST" => Method::POST,
            other => return Err(DispatchError::Method(other.to_string())),
        };

        let mut request = self
            .client
            .request(method, &hook.url)
            .header(CONTENT_TYPE, "application/json");

        if !hook.token.is_empty() {
            request = request.header(AUTHORIZATION, &hook.token);
        }

        if hook.has_body() {
            let body = self.template(&hook.request_body)?.render(process);
            request = request.body(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::BadStatus(status.as_u16()));
        }
        Ok(())
    }
}
