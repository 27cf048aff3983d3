use actix_web::dev::ServiceResponse;
use actix_web::http::StatusCode;
use actix_web::middleware::ErrorHandlerResponse;
use actix_web::{web, HttpResponse, Responder};
use log::{error, info};
use serde_json::json;

use crate::gemini::RelayError;
use crate::web::models::{ChatRequest, ChatResponse};
use crate::AppState;

// Process-level health endpoint
pub async fn health(data: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "uptime": data.started.elapsed().as_secs_f64(),
    }))
}

// Assistant health endpoint
pub async fn arona_health(data: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "model": data.config.model,
    }))
}

// Chat API endpoint
pub async fn chat(data: web::Data<AppState>, req: web::Json<ChatRequest>) -> impl Responder {
    if let Err(message) = req.validate() {
        return HttpResponse::BadRequest().json(json!({ "error": message }));
    }

    info!(
        "Chat request with {} history entries",
        req.history.len()
    );

    match data.gemini.generate_response(&req.message, &req.history).await {
        Ok(text) => HttpResponse::Ok().json(ChatResponse { text }),
        Err(err) => {
            error!("Chat endpoint failed: {err}");
            let status = match err {
                RelayError::ApiKeyMissing => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            HttpResponse::build(status).json(json!({ "error": err.to_string() }))
        }
    }
}

// Malformed bodies surface the first deserialization violation as a 400.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(1_048_576)
        .error_handler(|err, _req| {
            let message = err.to_string();
            actix_web::error::InternalError::from_response(
                err,
                HttpResponse::BadRequest().json(json!({ "error": message })),
            )
            .into()
        })
}

/// Safety net for errors no handler turned into a response. Responses built
/// by the handlers themselves pass through untouched; only error-generated
/// 500s are replaced with a fixed body so nothing internal leaks.
pub fn render_uncaught_error<B>(
    res: ServiceResponse<B>,
) -> actix_web::Result<ErrorHandlerResponse<B>> {
    match res.response().error() {
        None => Ok(ErrorHandlerResponse::Response(res.map_into_left_body())),
        Some(err) => {
            error!("Unhandled error: {err}");
            let (req, _res) = res.into_parts();
            let res = HttpResponse::InternalServerError()
                .json(json!({ "error": "Internal Server Error" }));
            Ok(ErrorHandlerResponse::Response(
                ServiceResponse::new(req, res).map_into_right_body(),
            ))
        }
    }
}
