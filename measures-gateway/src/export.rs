//! Spreadsheet export of current measures.
//!
//! The file is an HTML table served as `application/vnd.ms-excel`; spreadsheet
//! applications open it as a single sheet.

use crate::errors::{GatewayError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fmt::Write as _;

pub const CONTENT_TYPE: &str = "application/vnd.ms-excel; charset=utf-8";

/// Metrics always present in the export, in row order.
pub const WELL_KNOWN_METRICS: &[(&str, &str)] = &[
    ("bugs", "Bugs"),
    ("vulnerabilities", "Vulnerabilities"),
    ("code_smells", "Code Smells"),
    ("coverage", "Coverage"),
    ("duplicated_lines_density", "Duplicated Lines"),
];

/// Body of `api/measures/component`.
///
/// Missing and `null` fields decode as empty values.
#[derive(Debug, Default, Deserialize)]
pub struct MeasuresResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub component: Component,
}

#[derive(Debug, Default, Deserialize)]
pub struct Component {
    #[serde(default, deserialize_with = "null_as_default")]
    pub key: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub measures: Vec<Measure>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Measure {
    #[serde(default, deserialize_with = "null_as_default")]
    pub metric: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub value: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl MeasuresResponse {
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(GatewayError::InvalidUpstreamResponse)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct Row {
    pub label: String,
    pub value: String,
}

impl Row {
    fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// `Project` and `Generated` rows followed by one row per well-known metric.
/// A metric the upstream did not report gets an empty value.
pub fn build_rows(measures: &MeasuresResponse, date: NaiveDate) -> Vec<Row> {
    // Later duplicates win
    let values: HashMap<&str, &str> = measures
        .component
        .measures
        .iter()
        .map(|m| (m.metric.as_str(), m.value.as_str()))
        .collect();

    let mut rows = Vec::with_capacity(2 + WELL_KNOWN_METRICS.len());
    rows.push(Row::new("Project", measures.component.key.as_str()));
    rows.push(Row::new("Generated", date.format("%Y-%m-%d").to_string()));
    for (key, label) in WELL_KNOWN_METRICS {
        rows.push(Row::new(*label, values.get(key).copied().unwrap_or_default()));
    }
    rows
}

pub fn render_html(rows: &[Row]) -> String {
    let mut html = String::from(
        "<html><head><meta charset=\"UTF-8\"></head><body><table border=\"1\">\
         <tr><th>Field</th><th>Value</th></tr>",
    );
    for row in rows {
        let _ = write!(
            html,
            "<tr><td>{}</td><td>{}</td></tr>",
            escape_html(&row.label),
            escape_html(&row.value)
        );
    }
    html.push_str("</table></body></html>");
    html
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub fn filename(project_key: &str, date: NaiveDate) -> String {
    format!("{project_key}-SonarQube-{}.xls", date.format("%Y-%m-%d"))
}

/// `attachment; filename="..."` with characters that would break the quoted
/// string replaced by `_`.
pub fn content_disposition(project_key: &str, date: NaiveDate) -> String {
    let name: String = filename(project_key, date)
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    format!("attachment; filename=\"{name}\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    #[test]
    fn test_build_rows() {
        let measures = MeasuresResponse::from_slice(
            br#"{"component":{"key":"proj1","measures":[{"metric":"bugs","value":"3"}]}}"#,
        )
        .unwrap();

        let rows = build_rows(&measures, date());
        assert_eq!(
            rows,
            vec![
                Row::new("Project", "proj1"),
                Row::new("Generated", "2024-03-09"),
                Row::new("Bugs", "3"),
                Row::new("Vulnerabilities", ""),
                Row::new("Code Smells", ""),
                Row::new("Coverage", ""),
                Row::new("Duplicated Lines", ""),
            ]
        );
    }

    #[test]
    fn test_unknown_metrics_ignored_and_last_wins() {
        let measures = MeasuresResponse::from_slice(
            br#"{"component":{"key":"p","measures":[
                {"metric":"coverage","value":"10.0"},
                {"metric":"sqale_rating","value":"1.0"},
                {"metric":"coverage","value":"87.5"},
                {"metric":"duplicated_lines_density"}
            ]}}"#,
        )
        .unwrap();

        let rows = build_rows(&measures, date());
        assert_eq!(rows.len(), 7);
        assert_eq!(rows[5], Row::new("Coverage", "87.5"));
        assert_eq!(rows[6], Row::new("Duplicated Lines", ""));
    }

    #[test]
    fn test_decode() {
        assert!(matches!(
            MeasuresResponse::from_slice(b"<html>not json</html>"),
            Err(GatewayError::InvalidUpstreamResponse(_))
        ));
        // wrong type for measures
        assert!(MeasuresResponse::from_slice(br#"{"component":{"measures":1}}"#).is_err());

        let empty = MeasuresResponse::from_slice(b"{}").unwrap();
        assert_eq!(empty.component.key, "");
        assert!(empty.component.measures.is_empty());

        let null_component = MeasuresResponse::from_slice(br#"{"component":null}"#).unwrap();
        assert!(null_component.component.measures.is_empty());

        let partial = MeasuresResponse::from_slice(
            br#"{"component":{"key":null,"measures":[{"value":"1"},{"metric":"bugs","value":null}]}}"#,
        )
        .unwrap();
        assert_eq!(partial.component.key, "");
        assert_eq!(partial.component.measures.len(), 2);
        assert_eq!(partial.component.measures[0].metric, "");
        assert_eq!(partial.component.measures[0].value, "1");
        assert_eq!(partial.component.measures[1].metric, "bugs");
        assert_eq!(partial.component.measures[1].value, "");

        let rows = build_rows(&partial, date());
        assert_eq!(rows[2], Row::new("Bugs", ""));
    }

    #[test]
    fn test_render_html() {
        let html = render_html(&[Row::new("Project", "proj1"), Row::new("Bugs", "3")]);
        assert_eq!(
            html,
            "<html><head><meta charset=\"UTF-8\"></head><body><table border=\"1\">\
             <tr><th>Field</th><th>Value</th></tr>\
             <tr><td>Project</td><td>proj1</td></tr>\
             <tr><td>Bugs</td><td>3</td></tr>\
             </table></body></html>"
        );
    }

    #[test]
    fn test_render_html_escapes_values() {
        let html = render_html(&[Row::new("Project", "<script>alert('x')</script>&\"")]);
        assert!(html.contains(
            "<td>&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;&amp;&quot;</td>"
        ));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_content_disposition() {
        assert_eq!(filename("proj1", date()), "proj1-SonarQube-2024-03-09.xls");
        assert_eq!(
            content_disposition("proj1", date()),
            "attachment; filename=\"proj1-SonarQube-2024-03-09.xls\""
        );
        assert_eq!(
            content_disposition("a\"b\\c\nd", date()),
            "attachment; filename=\"a_b_c_d-SonarQube-2024-03-09.xls\""
        );
    }
}
