use crate::config::SonarQubeConfig;
use crate::errors::{GatewayError, Result};
use crate::export::{self, MeasuresResponse};
use crate::metrics_defs::{REQUESTS, REQUESTS_INFLIGHT, UPSTREAM_DURATION, UPSTREAM_ERRORS};
use crate::params::{
    DEFAULT_EXPORT_METRIC_KEYS, DEFAULT_METRIC_KEYS, HistoryQuery, MeasuresQuery, QueryParams,
};
use crate::relay::{GatewayBody, passthrough_body, relay_response};
use crate::upstream::SonarClient;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{ALLOW, CONTENT_DISPOSITION, CONTENT_TYPE, HeaderValue};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use shared::http::{make_boxed_error_response, make_text_response};
use shared::{counter, gauge, histogram};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::timeout_at;
use url::Url;

/// Public routes served by the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    Measures,
    History,
    ExportXls,
}

impl Route {
    pub fn from_path(path: &str) -> Option<Self> {
        match path {
            "/api/medidas" => Some(Route::Measures),
            "/api/historico" => Some(Route::History),
            "/api/export/xls" => Some(Route::ExportXls),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Route::Measures => "measures",
            Route::History => "history",
            Route::ExportXls => "export_xls",
        }
    }
}

/// Counts a request in `requests.inflight` until dropped, which also covers
/// handler futures cancelled by a client disconnect.
struct InflightGuard;

impl InflightGuard {
    fn new() -> Self {
        gauge!(REQUESTS_INFLIGHT).increment(1.0);
        Self
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        gauge!(REQUESTS_INFLIGHT).decrement(1.0);
    }
}

/// Read-only state shared by every request.
pub struct Gateway {
    config: SonarQubeConfig,
    client: SonarClient,
}

impl Gateway {
    pub fn new(config: SonarQubeConfig) -> Result<Self> {
        let client = SonarClient::new(&config)?;
        Ok(Self { config, client })
    }

    /// Handles one inbound request. Errors are already turned into responses.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<GatewayBody> {
        let Some(route) = Route::from_path(req.uri().path()) else {
            tracing::debug!(path = %req.uri().path(), "No route matched");
            return make_boxed_error_response(StatusCode::NOT_FOUND);
        };

        if !matches!(*req.method(), Method::GET | Method::HEAD) {
            let mut response = make_boxed_error_response(StatusCode::METHOD_NOT_ALLOWED);
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("GET, HEAD"));
            return response;
        }

        let params = QueryParams::parse(req.uri().query());
        drop(req);

        let inflight = InflightGuard::new();
        let result = match route {
            Route::Measures => self.forward_measures(&params).await,
            Route::History => self.forward_history(&params).await,
            Route::ExportXls => self.export_xls(&params).await,
        };
        drop(inflight);

        let response = result.unwrap_or_else(|e| error_response(route, e));
        tracing::debug!(route = route.as_str(), status = %response.status(), "Request handled");
        counter!(
            REQUESTS,
            "route" => route.as_str(),
            "status" => response.status().as_u16().to_string()
        )
        .increment(1);
        response
    }

    /// `GET /api/medidas`: relays `api/measures/component`.
    async fn forward_measures(&self, params: &QueryParams) -> Result<Response<GatewayBody>> {
        let query =
            MeasuresQuery::from_params(params, DEFAULT_METRIC_KEYS, &self.config.default_branch)?;
        let upstream = self
            .call_upstream(Route::Measures, query.upstream_url(&self.config.measures_url))
            .await?;
        relay_response(upstream)
    }

    /// `GET /api/historico`: relays `api/measures/search_history`.
    async fn forward_history(&self, params: &QueryParams) -> Result<Response<GatewayBody>> {
        let query = HistoryQuery::from_params(params, &self.config.default_branch)?;
        let upstream = self
            .call_upstream(Route::History, query.upstream_url(&self.config.history_url))
            .await?;
        relay_response(upstream)
    }

    /// `GET /api/export/xls`: current measures as a spreadsheet download.
    ///
    /// One deadline covers both the upstream headers and the JSON body.
    async fn export_xls(&self, params: &QueryParams) -> Result<Response<GatewayBody>> {
        let query = MeasuresQuery::from_params(
            params,
            DEFAULT_EXPORT_METRIC_KEYS,
            &self.config.default_branch,
        )?;
        let deadline = tokio::time::Instant::now() + self.config.timeout();
        let upstream = self
            .call_upstream(Route::ExportXls, query.upstream_url(&self.config.measures_url))
            .await?;

        if !upstream.status().is_success() {
            tracing::info!(status = %upstream.status(), "Passing through SonarQube error");
            return passthrough_body(upstream);
        }

        let body = timeout_at(deadline, upstream.bytes())
            .await
            .map_err(|_| GatewayError::UpstreamTimeout(self.config.timeout_secs))?
            .map_err(|e| GatewayError::UpstreamRequestFailed(e.to_string()))?;

        let measures = MeasuresResponse::from_slice(&body)?;
        let today = chrono::Local::now().date_naive();
        let html = export::render_html(&export::build_rows(&measures, today));
        let disposition = export::content_disposition(&measures.component.key, today);

        Ok(Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, export::CONTENT_TYPE)
            .header(
                CONTENT_DISPOSITION,
                HeaderValue::from_bytes(disposition.as_bytes()).map_err(|e| {
                    GatewayError::InternalError(format!("Invalid content disposition: {e}"))
                })?,
            )
            .body(Full::new(Bytes::from(html)).map_err(|e| match e {}).boxed())?)
    }

    async fn call_upstream(&self, route: Route, url: Url) -> Result<reqwest::Response> {
        let started = Instant::now();
        let result = self.client.get(url).await;
        histogram!(UPSTREAM_DURATION, "route" => route.as_str())
            .record(started.elapsed().as_secs_f64());

        if result.is_err() {
            counter!(UPSTREAM_ERRORS, "route" => route.as_str()).increment(1);
        }
        result
    }
}

fn error_response(route: Route, error: GatewayError) -> Response<GatewayBody> {
    let status = error.status_code();
    match &error {
        GatewayError::MissingParameter(_) => {
            tracing::debug!(route = route.as_str(), error = %error, "Rejected request");
        }
        GatewayError::UpstreamRequestFailed(_) | GatewayError::UpstreamTimeout(_) => {
            tracing::warn!(route = route.as_str(), error = %error, "SonarQube unreachable");
        }
        GatewayError::InvalidUpstreamResponse(source) => {
            tracing::error!(route = route.as_str(), error = %source, "Unexpected SonarQube response");
        }
        _ => tracing::error!(route = route.as_str(), error = %error, "Request failed"),
    }
    make_text_response(status, error.to_string())
}

/// hyper service wrapping a shared [`Gateway`].
#[derive(Clone)]
pub struct GatewayService {
    gateway: Arc<Gateway>,
}

impl GatewayService {
    pub fn new(gateway: Gateway) -> Self {
        Self {
            gateway: Arc::new(gateway),
        }
    }
}

impl Service<Request<Incoming>> for GatewayService {
    type Response = Response<GatewayBody>;
    type Error = GatewayError;
    type Future =
        Pin<Box<dyn Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let gateway = self.gateway.clone();
        Box::pin(async move { Ok(gateway.handle(req).await) })
    }
}
