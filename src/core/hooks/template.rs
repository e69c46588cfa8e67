//! Request body templates.
//!
//! A template is free text with `{{.FieldName}}` placeholders naming
//! process fields. Strings are JSON-escaped on the way in so a template may
//! quote a placeholder inside a JSON document.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use thiserror::Error;

use crate::core::process::ProcessRecord;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown placeholder '{0}'")]
    UnknownField(String),
    #[error("unterminated or malformed placeholder at byte {0}")]
    Unbalanced(usize),
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*\.([A-Za-z][A-Za-z0-9]*)\s*\}\}").expect("placeholder pattern")
    })
}

enum Segment {
    Text(String),
    Field(String),
}

pub struct BodyTemplate {
    segments: Vec<Segment>,
}

impl BodyTemplate {
    /// Parses `source`, rejecting stray braces and unknown field names.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let known = process_fields(&ProcessRecord::default());
        let mut segments = Vec::new();
        let mut last = 0;

        for caps in placeholder_re().captures_iter(source) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            push_text(&mut segments, source, last, whole.start())?;

            let name = &caps[1];
            if !known.contains_key(name) {
                return Err(TemplateError::UnknownField(name.to_string()));
            }
            segments.push(Segment::Field(name.to_string()));
            last = whole.end();
        }
        push_text(&mut segments, source, last, source.len())?;

        Ok(Self { segments })
    }

    pub fn render(&self, process: &ProcessRecord) -> String {
        let fields = process_fields(process);
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Field(name) => {
                    if let Some(value) = fields.get(name) {
                        out.push_str(&render_value(value));
                    }
                }
            }
        }
        out
    }
}

fn push_text(
    segments: &mut Vec<Segment>,
    source: &str,
    start: usize,
    end: usize,
) -> Result<(), TemplateError> {
    let text = &source[start..end];
    if let Some(pos) = text.find("{{") {
        return Err(TemplateError::Unbalanced(start + pos));
    }
    if !text.is_empty() {
        segments.push(Segment::Text(text.to_string()));
    }
    Ok(())
}

fn process_fields(process: &ProcessRecord) -> Map<String, Value> {
    match serde_json::to_value(process) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => {
            let quoted = Value::String(s.clone()).to_string();
            quoted[1..quoted.len() - 1].to_string()
        }
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_core_fields() {
        let process = ProcessRecord {
            id: 1,
            status: "complete".to_string(),
            process_type_name: "Test Process Name".to_string(),
            task_name: "Test Task Name".to_string(),
            created_by: "Test User".to_string(),
            account_id: 2,
            ..Default::default()
        };
        let template = BodyTemplate::parse(
            "{{.Id}}, {{.Status}}, {{.ProcessTypeName}}, {{.TaskName}}, {{.CreatedBy}}, {{.AccountId}}",
        )
        .unwrap();
        assert_eq!(
            template.render(&process),
            "1, complete, Test Process Name, Test Task Name, Test User, 2"
        );
    }

    #[test]
    fn interpolates_flags_and_auxiliary_fields() {
        let process = ProcessRecord {
            success: true,
            created_by_display_name: "Test User".to_string(),
            input: "Test Input".to_string(),
            app_id: 2,
            job_template_id: 2,
            container_name: "Test Container Name".to_string(),
            ..Default::default()
        };
        let template = BodyTemplate::parse(
            "{{.Success}}, {{.CreatedByDisplayName}}, {{ .Input }}, {{.AppId}}, {{.JobTemplateId}}, {{.ContainerName}}",
        )
        .unwrap();
        assert_eq!(
            template.render(&process),
            "true, Test User, Test Input, 2, 2, Test Container Name"
        );
    }

    #[test]
    fn escapes_strings_for_json_bodies() {
        let process = ProcessRecord {
            message: "disk \"sda\" full\nretrying".to_string(),
            ..Default::default()
        };
        let template = BodyTemplate::parse(r#"{"message": "{{.Message}}"}"#).unwrap();
        let body = template.render(&process);

        let parsed: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["message"], "disk \"sda\" full\nretrying");
    }

    #[test]
    fn rejects_unknown_and_hidden_fields() {
        assert_eq!(
            BodyTemplate::parse("{{.Nope}}").err(),
            Some(TemplateError::UnknownField("Nope".to_string()))
        );
        assert_eq!(
            BodyTemplate::parse("{{.ApiKey}}").err(),
            Some(TemplateError::UnknownField("ApiKey".to_string()))
        );
    }

    #[test]
    fn rejects_stray_braces() {
        assert!(matches!(
            BodyTemplate::parse(r#"{"id": {{.Id}"#),
            Err(TemplateError::Unbalanced(_))
        ));
        assert!(matches!(
            BodyTemplate::parse("{{Id}}"),
            Err(TemplateError::Unbalanced(0))
        ));
    }

    #[test]
    fn closing_braces_outside_placeholders_are_text() {
        let process = ProcessRecord {
            id: 12,
            ..Default::default()
        };
        let template = BodyTemplate::parse(r#"{"data": {"id": {{.Id}}}}"#).unwrap();
        assert_eq!(template.render(&process), r#"{"data": {"id": 12}}"#);
    }

    #[test]
    fn plain_text_passes_through() {
        let template = BodyTemplate::parse(r#"{"event": "done"}"#).unwrap();
        assert_eq!(
            template.render(&ProcessRecord::default()),
            r#"{"event": "done"}"#
        );
    }
}
