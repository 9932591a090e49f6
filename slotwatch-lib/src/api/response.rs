use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::error::{Result, SlotwatchError};

pub type RespBody = BoxBody<Bytes, hyper::Error>;

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

pub fn full_body(bytes: impl Into<Bytes>) -> RespBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Result<Response<RespBody>> {
    let body_bytes = serde_json::to_vec(value)?;

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(full_body(body_bytes))
        .map_err(|e| SlotwatchError::Http(format!("Failed to build response: {e}")))
}

/// `{"success": true, "data": ...}`
pub fn success<T: Serialize>(status: StatusCode, data: T) -> Result<Response<RespBody>> {
    json_response(status, &Envelope { success: true, data: Some(data), message: None })
}

/// `{"success": false, "message": ...}`
pub fn failure(status: StatusCode, message: &str) -> Result<Response<RespBody>> {
    json_response(status, &Envelope::<()> { success: false, data: None, message: Some(message) })
}

/// Last-resort response when building a proper one failed.
pub fn internal_error() -> Response<RespBody> {
    let mut resp = Response::new(full_body("Internal Server Error"));
    *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    resp
}
