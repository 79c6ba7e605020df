//! Inbound query parsing and upstream URL construction.
//!
//! A parameter that is present with an empty value is treated the same as an
//! absent one, and only the first occurrence of a repeated name is used.

use crate::errors::{GatewayError, Result};
use std::collections::HashMap;
use url::Url;

pub const DEFAULT_METRIC_KEYS: &str = "bugs,vulnerabilities,code_smells";
pub const DEFAULT_EXPORT_METRIC_KEYS: &str =
    "bugs,vulnerabilities,code_smells,coverage,duplicated_lines_density";
pub const HISTORY_PAGE_SIZE: &str = "500";

/// Decoded query string of an inbound request.
#[derive(Debug, Default)]
pub struct QueryParams {
    values: HashMap<String, String>,
}

impl QueryParams {
    pub fn parse(query: Option<&str>) -> Self {
        let mut values = HashMap::new();
        if let Some(query) = query {
            for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
                values.entry(k.into_owned()).or_insert_with(|| v.into_owned());
            }
        }
        Self { values }
    }

    /// Value of `name`, or `None` if absent or empty.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    fn require(&self, name: &'static str) -> Result<&str> {
        self.get(name).ok_or(GatewayError::MissingParameter(name))
    }
}

/// Query for `api/measures/component`.
#[derive(Debug, PartialEq)]
pub struct MeasuresQuery {
    pub component: String,
    pub metric_keys: String,
    pub branch: String,
}

impl MeasuresQuery {
    pub fn from_params(
        params: &QueryParams,
        default_metric_keys: &str,
        default_branch: &str,
    ) -> Result<Self> {
        Ok(Self {
            component: params.require("component")?.to_string(),
            metric_keys: params
                .get("metricKeys")
                .unwrap_or(default_metric_keys)
                .to_string(),
            branch: params.get("branch").unwrap_or(default_branch).to_string(),
        })
    }

    pub fn upstream_url(&self, endpoint: &Url) -> Url {
        let mut url = endpoint.clone();
        url.query_pairs_mut()
            .clear()
            .append_pair("component", &self.component)
            .append_pair("metricKeys", &self.metric_keys)
            .append_pair("branch", &self.branch);
        url
    }
}

/// Query for `api/measures/search_history`.
#[derive(Debug, PartialEq)]
pub struct HistoryQuery {
    pub component: String,
    pub metrics: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub branch: String,
}

impl HistoryQuery {
    pub fn from_params(params: &QueryParams, default_branch: &str) -> Result<Self> {
        Ok(Self {
            component: params.require("component")?.to_string(),
            metrics: params
                .get("metrics")
                .unwrap_or(DEFAULT_METRIC_KEYS)
                .to_string(),
            from: params.get("from").map(str::to_string),
            to: params.get("to").map(str::to_string),
            branch: params.get("branch").unwrap_or(default_branch).to_string(),
        })
    }

    pub fn upstream_url(&self, endpoint: &Url) -> Url {
        let mut url = endpoint.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .clear()
                .append_pair("component", &self.component)
                .append_pair("metrics", &self.metrics);
            if let Some(from) = &self.from {
                pairs.append_pair("from", from);
            }
            if let Some(to) = &self.to {
                pairs.append_pair("to", to);
            }
            pairs
                .append_pair("ps", HISTORY_PAGE_SIZE)
                .append_pair("branch", &self.branch);
        }
        url
    }
}
