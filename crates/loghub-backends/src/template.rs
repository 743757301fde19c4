//! Query templates for search-engine backends.
//!
//! A template is a JSON document with `{{ .Field }}` placeholders that are
//! filled from the resolved search params. String values are JSON-escaped,
//! so a placeholder belongs inside a JSON string literal:
//!
//! ```json
//! {"query": {"match": {"message": "{{ .Query }}"}}, "sort": [{"@timestamp": "desc"}]}
//! ```
//!
//! Supported fields: `Query`, `Start`, `End` (raw expressions), `StartTime`,
//! `EndTime` (resolved RFC3339, empty when unbounded), `Limit`, `Page`,
//! `Type`, `Id` and `Labels.<key>`.

use chrono::SecondsFormat;
use loghub_core::SearchParams;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*\.([A-Za-z]+)(?:\.([A-Za-z0-9_./-]+))?\s*\}\}")
        .unwrap_or_else(|_| unreachable!())
});

/// Errors raised while parsing a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// A placeholder names a field that does not exist.
    #[error("unknown field '{0}'")]
    UnknownField(String),

    /// `Labels` was used without a key.
    #[error("'Labels' needs a key, as in {{{{ .Labels.app }}}}")]
    MissingLabelKey,

    /// A `{{` is not part of a valid placeholder.
    #[error("unterminated or malformed placeholder at byte {0}")]
    Malformed(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Field {
    Query,
    Start,
    End,
    StartTime,
    EndTime,
    Limit,
    Page,
    Type,
    Id,
    Label(String),
}

impl Field {
    fn parse(name: &str, key: Option<&str>) -> Result<Self, TemplateError> {
        let field = match (name, key) {
            ("Labels", Some(key)) => Self::Label(key.to_string()),
            ("Labels", None) => return Err(TemplateError::MissingLabelKey),
            (_, Some(key)) => return Err(TemplateError::UnknownField(format!("{name}.{key}"))),
            ("Query", None) => Self::Query,
            ("Start", None) => Self::Start,
            ("End", None) => Self::End,
            ("StartTime", None) => Self::StartTime,
            ("EndTime", None) => Self::EndTime,
            ("Limit", None) => Self::Limit,
            ("Page", None) => Self::Page,
            ("Type", None) => Self::Type,
            ("Id", None) => Self::Id,
            (other, None) => return Err(TemplateError::UnknownField(other.to_string())),
        };
        Ok(field)
    }

    fn value(&self, params: &SearchParams) -> String {
        let rfc3339 = |instant: Option<chrono::DateTime<chrono::Utc>>| {
            instant
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
                .unwrap_or_default()
        };
        match self {
            Self::Query => json_escape(&params.query),
            Self::Start => json_escape(&params.start),
            Self::End => json_escape(&params.end),
            Self::StartTime => rfc3339(params.start_instant()),
            Self::EndTime => rfc3339(params.end_instant()),
            Self::Limit => params.limit.to_string(),
            Self::Page => json_escape(&params.page),
            Self::Type => json_escape(&params.log_type),
            Self::Id => json_escape(&params.id),
            Self::Label(key) => params
                .labels
                .get(key)
                .map(|v| json_escape(v))
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

/// A parsed query template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    segments: Vec<Segment>,
}

impl QueryTemplate {
    /// Parses `source`.
    ///
    /// # Errors
    ///
    /// Returns an error when a placeholder is malformed or names an unknown
    /// field.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut cursor = 0;

        for caps in PLACEHOLDER.captures_iter(source) {
            let Some(whole) = caps.get(0) else { continue };
            push_literal(&mut segments, source, cursor, whole.start())?;
            let name = caps.get(1).map_or("", |m| m.as_str());
            let key = caps.get(2).map(|m| m.as_str());
            segments.push(Segment::Field(Field::parse(name, key)?));
            cursor = whole.end();
        }
        push_literal(&mut segments, source, cursor, source.len())?;

        Ok(Self { segments })
    }

    /// True when the template has no content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Fills the placeholders from `params`.
    #[must_use]
    pub fn render(&self, params: &SearchParams) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(field) => out.push_str(&field.value(params)),
            }
        }
        out
    }
}

fn push_literal(
    segments: &mut Vec<Segment>,
    source: &str,
    from: usize,
    to: usize,
) -> Result<(), TemplateError> {
    let text = &source[from..to];
    if let Some(offset) = text.find("{{") {
        return Err(TemplateError::Malformed(from + offset));
    }
    if !text.is_empty() {
        segments.push(Segment::Literal(text.to_string()));
    }
    Ok(())
}

/// Escapes `value` for use inside a JSON string literal.
fn json_escape(value: &str) -> String {
    let quoted = serde_json::Value::String(value.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn params() -> SearchParams {
        SearchParams::new()
            .with_query("status:500")
            .with_type("KubernetesPod")
            .with_id("default/web-1")
            .with_label("app", "web")
            .with_limit(20)
            .resolve()
    }

    #[test]
    fn renders_fields() {
        let template = QueryTemplate::parse(
            r#"{"size": {{.Limit}}, "q": "{{ .Query }}", "id": "{{.Id}}", "app": "{{.Labels.app}}"}"#,
        )
        .unwrap();

        let body = template.render(&params());
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();

        assert_eq!(json["size"], 20);
        assert_eq!(json["q"], "status:500");
        assert_eq!(json["id"], "default/web-1");
        assert_eq!(json["app"], "web");
    }

    #[test]
    fn escapes_string_values() {
        let template = QueryTemplate::parse(r#"{"q": "{{.Query}}"}"#).unwrap();
        let params = SearchParams::new().with_query("say \"hi\"\n").resolve();

        let json: serde_json::Value = serde_json::from_str(&template.render(&params)).unwrap();
        assert_eq!(json["q"], "say \"hi\"\n");
    }

    #[test]
    fn missing_label_renders_empty() {
        let template = QueryTemplate::parse(r#""{{.Labels.team}}""#).unwrap();
        assert_eq!(template.render(&params()), r#""""#);
    }

    #[test]
    fn resolved_times() {
        let template = QueryTemplate::parse("{{.StartTime}}|{{.EndTime}}|{{.Start}}").unwrap();
        let rendered = template.render(&params());
        let parts: Vec<&str> = rendered.split('|').collect();

        assert!(chrono::DateTime::parse_from_rfc3339(parts[0]).is_ok());
        assert_eq!(parts[1], "");
        assert_eq!(parts[2], "1h");
    }

    #[test]
    fn literal_braces_are_kept() {
        let source = r#"{"query": {"match_all": {}}}"#;
        let template = QueryTemplate::parse(source).unwrap();
        assert_eq!(template.render(&params()), source);
    }

    #[test]
    fn empty_template() {
        let template = QueryTemplate::parse("").unwrap();
        assert!(template.is_empty());
        assert_eq!(template.render(&params()), "");
    }

    #[test_case("{{.Nope}}", TemplateError::UnknownField("Nope".to_string()) ; "unknown field")]
    #[test_case("{{.Query.x}}", TemplateError::UnknownField("Query.x".to_string()) ; "field with key")]
    #[test_case("{{.Labels}}", TemplateError::MissingLabelKey ; "labels without key")]
    #[test_case(r#"{"q": "{{.Query"}"#, TemplateError::Malformed(7) ; "unterminated")]
    #[test_case("{{ Query }}", TemplateError::Malformed(0) ; "missing dot")]
    fn parse_errors(source: &str, expected: TemplateError) {
        assert_eq!(QueryTemplate::parse(source), Err(expected));
    }
}
