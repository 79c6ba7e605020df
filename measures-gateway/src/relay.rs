use crate::errors::{GatewayError, Result};
use futures_util::TryStreamExt;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, StreamBody};
use hyper::Response;
use hyper::body::{Bytes, Frame};
use shared::http::filter_hop_by_hop;

pub type GatewayBody = BoxBody<Bytes, GatewayError>;

/// Streams the upstream body to the caller as it arrives.
///
/// Dropping the returned body drops the upstream response and releases its
/// connection.
pub fn stream_body(upstream: reqwest::Response) -> GatewayBody {
    let frames = upstream
        .bytes_stream()
        .map_ok(Frame::data)
        .map_err(|e| GatewayError::UpstreamBody(e.to_string()));

    StreamBody::new(frames).boxed()
}

/// Relays an upstream response: status, every header value, and the body.
///
/// Repeated headers keep all of their values. Connection-level hop-by-hop
/// headers are dropped since they describe the upstream connection.
pub fn relay_response(upstream: reqwest::Response) -> Result<Response<GatewayBody>> {
    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    filter_hop_by_hop(&mut headers, upstream.version());

    let mut response = Response::builder().status(status).body(stream_body(upstream))?;
    let outbound = response.headers_mut();
    for (name, value) in headers.iter() {
        outbound.append(name, value.clone());
    }

    Ok(response)
}

/// Status and raw body of an upstream response, without its headers.
pub fn passthrough_body(upstream: reqwest::Response) -> Result<Response<GatewayBody>> {
    let status = upstream.status();
    Ok(Response::builder()
        .status(status)
        .body(stream_body(upstream))?)
}
