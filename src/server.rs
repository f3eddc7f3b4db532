use crate::Scheduler;
use crate::config::Config;
use crate::data::{ScheduleRequest, ScheduleResponse};
use crate::error::{Error, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing::post};
use log::{error, info, warn};
use serde::Serialize;
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;

#[derive(Debug, Serialize)]
struct ErrorDetail {
    field: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    details: Vec<ErrorDetail>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let details = match &self {
            Error::Input(errors) => errors
                .errors()
                .iter()
                .map(|e| ErrorDetail {
                    field: e.field().to_string(),
                    message: e.to_string(),
                })
                .collect(),
            _ => Vec::new(),
        };
        let body = ErrorBody {
            error: self.to_string(),
            details,
        };
        (status, Json(body)).into_response()
    }
}

async fn calculate_handler(
    State(scheduler): State<Arc<Scheduler>>,
    Json(request): Json<ScheduleRequest>,
) -> Result<Json<ScheduleResponse>> {
    // The search is CPU-bound; keep it off the async workers.
    let outcome = tokio::task::spawn_blocking(move || scheduler.calculate(&request))
        .await
        .map_err(|e| Error::Worker(e.to_string()))?;

    match outcome {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            match &e {
                Error::Input(_) => warn!("Rejected scheduling request: {e}"),
                _ => error!("Scheduling request failed: {e}"),
            }
            Err(e)
        }
    }
}

/// Builds the router exposing `POST /schedules/calculating`.
pub fn router(scheduler: Scheduler, max_concurrent: usize) -> Router {
    Router::new()
        .route("/schedules/calculating", post(calculate_handler))
        .layer(ConcurrencyLimitLayer::new(max_concurrent))
        .with_state(Arc::new(scheduler))
}

pub async fn run_server(config: Config) -> Result<()> {
    let app = router(Scheduler::new(config.limits), config.max_concurrent);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;

    info!("Server running at http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{InputError, InputErrors};
    use axum::body::to_bytes;

    #[tokio::test]
    async fn test_input_error_body() {
        let errors = InputErrors::from_vec(vec![InputError::UnknownReference {
            field: "sections[0].instructorId".into(),
            entity: "instructor",
            id: 5,
        }])
        .unwrap();
        let response = Error::from(errors).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["details"][0]["field"], "sections[0].instructorId");
    }

    #[tokio::test]
    async fn test_worker_error_is_500_without_details() {
        let response = Error::Worker("task panicked".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body.get("details").is_none());
    }
}
