pub mod matcher;
pub mod template;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::core::process::{ProcessTypeLookup, STATUS_EXECUTING};
use template::BodyTemplate;

pub const DEFAULT_HOOKS_FILE: &str = "webhook.yaml";

/// Status values a trigger may name. Empty means "any".
const TRIGGER_STATUSES: &[&str] = &["complete", "failed", ""];

/// Trigger criteria. Every criterion that is set must match for the hook to
/// fire. An `account_id` of 0 is unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Trigger {
    pub status: String,
    /// Configured as a process type code, replaced by its display name once
    /// codes are resolved.
    pub process_type: String,
    pub task_name: String,
    pub account_id: i64,
    pub created_by: String,
}

impl Trigger {
    pub fn is_empty(&self) -> bool {
        matcher::set_criteria(self).is_empty()
    }
}

/// One outbound webhook definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Hook {
    pub description: String,
    pub url: String,
    pub method: String,
    /// Sent verbatim as the `Authorization` header when non-empty.
    pub token: String,
    pub request_body: String,
    pub triggers: Trigger,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct HookEntry {
    webhook: Hook,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HookError {
    #[error("no description is set")]
    NoDescription,
    #[error("method '{0}' is not acceptable, use GET or POST")]
    BadMethod(String),
    #[error("url '{0}' appears to be invalid")]
    BadUrl(String),
    #[error("method requires a requestBody")]
    NoBody,
    #[error("could not parse requestBody, check included variables: {0}")]
    CouldNotParseBody(String),
    #[error("no triggers defined")]
    NoTrigger,
    #[error("cannot trigger on status 'executing'")]
    ExecutingStatusTrigger,
    #[error("trigger status '{0}' is not recognised")]
    BadStatusTrigger(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("webhook #{} ('{description}'): {reason}", .index + 1)]
pub struct InvalidHook {
    pub index: usize,
    pub description: String,
    pub reason: HookError,
}

impl Hook {
    /// Checks one definition. The first failing check is reported.
    pub fn validate(&self) -> Result<(), HookError> {
        if self.description.is_empty() {
            return Err(HookError::NoDescription);
        }

        if !matches!(self.method.as_str(), "GET" | "POST") {
            return Err(HookError::BadMethod(self.method.clone()));
        }

        if url::Url::parse(&self.url).is_err() {
            return Err(HookError::BadUrl(self.url.clone()));
        }

        if self.method != "GET" {
            if self.request_body.is_empty() {
                return Err(HookError::NoBody);
            }
            BodyTemplate::parse(&self.request_body)
                .map_err(|e| HookError::CouldNotParseBody(e.to_string()))?;
        }

        if self.triggers.is_empty() {
            return Err(HookError::NoTrigger);
        }

        if self.triggers.status == STATUS_EXECUTING {
            return Err(HookError::ExecutingStatusTrigger);
        }
        if !TRIGGER_STATUSES.contains(&self.triggers.status.as_str()) {
            return Err(HookError::BadStatusTrigger(self.triggers.status.clone()));
        }

        Ok(())
    }

    pub fn has_body(&self) -> bool {
        self.method != "GET" && !self.request_body.is_empty()
    }
}

/// The configured webhooks, read-only once loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookSet {
    hooks: Vec<Hook>,
}

impl HookSet {
    pub fn new(hooks: Vec<Hook>) -> Self {
        Self { hooks }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let entries: Option<Vec<HookEntry>> =
            serde_yaml::from_str(raw).context("webhook configuration is not valid YAML")?;
        let hooks = entries
            .unwrap_or_default()
            .into_iter()
            .map(|e| e.webhook)
            .collect();
        Ok(Self::new(hooks))
    }

    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read webhook configuration {}", path.display()))?;
        let set = Self::parse(&raw)
            .with_context(|| format!("failed to parse webhook configuration {}", path.display()))?;
        info!("Loaded {} webhook(s) from {}", set.len(), path.display());
        Ok(set)
    }

    pub fn validate(&self) -> Result<(), InvalidHook> {
        for (index, hook) in self.hooks.iter().enumerate() {
            hook.validate().map_err(|reason| InvalidHook {
                index,
                description: hook.description.clone(),
                reason,
            })?;
        }
        Ok(())
    }

    /// Swaps process type codes for display names. Codes the lookup does not
    /// know are kept, which leaves that hook unable to match on process type.
    /// Returns the number of unresolved codes.
    pub fn resolve_process_type_codes(&mut self, lookup: &ProcessTypeLookup) -> usize {
        let mut unresolved = 0;
        for hook in &mut self.hooks {
            let code = &hook.triggers.process_type;
            if code.is_empty() {
                continue;
            }
            match lookup.name_for(code) {
                Some(name) => hook.triggers.process_type = name.to_string(),
                None => {
                    warn!(
                        "Process type '{}' not found for webhook '{}', it will never match on process type",
                        code, hook.description
                    );
                    unresolved += 1;
                }
            }
        }
        unresolved
    }

    pub fn iter(&self) -> impl Iterator<Item = &Hook> {
        self.hooks.iter()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}
