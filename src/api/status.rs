//! The typed `Status` error envelope every failed request gets back (spec.md §4.5),
//! plus the `ApiError → HttpResponse` mapping.

use actix_web::HttpResponse;
use serde::Serialize;

use crate::errors::ApiError;

#[derive(Debug, Serialize)]
pub struct Status {
    pub status: &'static str,
    pub reason: &'static str,
    pub message: String,
    pub code: u16,
}

impl Status {
    pub fn from_error(err: &ApiError) -> Self {
        Self {
            status: "Failure",
            reason: err.reason(),
            message: err.to_string(),
            code: err.http_status(),
        }
    }
}

/// Maps an [`ApiError`] to the actix response the wire protocol mandates: the typed
/// `Status` body at the status's own HTTP code (spec.md §4.5 "typed Status object").
pub fn error_response(err: ApiError) -> HttpResponse {
    let status = Status::from_error(&err);
    HttpResponse::build(actix_web::http::StatusCode::from_u16(status.code).unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR)).json(status)
}
