//! HTTP glue shared by the stage services.

use actix_web::http::StatusCode;
use actix_web::{error, web, HttpResponse, ResponseError};
use serde_json::json;

use crate::error::StageError;

impl ResponseError for StageError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::BAD_GATEWAY)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

/// Answers unparsable request bodies with `400` and the usual error body.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let body = json!({ "error": err.to_string() });
        error::InternalError::from_response(err, HttpResponse::BadRequest().json(body)).into()
    })
}
