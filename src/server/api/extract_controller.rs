use axum::extract::Query;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use nanoid::nanoid;
use tracing::debug;

use crate::server::dtos::extraction_dto::{ExtractStreamBody, ExtractStreamErrorBody, ExtractStreamParams, ExtractStreamResult};
use crate::server::error::{AppResult, Error};
use crate::server::extractors::ClientIdentity;
use crate::server::extraction::engine;
use crate::server::extraction::model::Phase;
use crate::server::progress::sse::progress_stream;
use crate::server::services::rate_limit_services::RateLimitResult;

pub struct ExtractController;

impl ExtractController {
    pub fn app() -> Router {
        Router::new()
            .route("/extract-stream-progress", get(Self::extract_stream_progress))
            .route("/extract-stream", post(Self::extract_stream_sync))
    }

    /// `GET /extract-stream-progress` - opens an SSE stream, spawns the engine in
    /// the background and lets the progress bus feed the response. responds 200
    /// as soon as the job is accepted, then streams progress as it happens.
    async fn extract_stream_progress(
        ClientIdentity(client_id, services): ClientIdentity,
        Query(params): Query<ExtractStreamParams>,
    ) -> AppResult<Response> {
        match services.rate_limit.check_rate_limit(&client_id).await {
            RateLimitResult::RateLimited { retry_after } => {
                return Err(Error::RateLimited { retry_after_secs: retry_after });
            }
            RateLimitResult::TimedOut { retry_after, .. } => {
                return Err(Error::RateLimited { retry_after_secs: retry_after });
            }
            RateLimitResult::Allowed { .. } => {}
        }

        let request = params.into_extraction_request()?;
        let request_id = nanoid!();

        debug!("accepted extraction job {request_id} for {:?}", request.server);

        let job = services.job_registry.create(request_id.clone()).await;
        engine::spawn(job, request, services.clone());

        Ok(progress_stream(services.job_registry.clone(), request_id).into_response())
    }

    /// `POST /extract-stream` - the synchronous variant: runs the same engine but
    /// blocks the handler on the job's own event stream until a terminal event
    /// arrives, then returns it as a single JSON body instead of SSE frames.
    async fn extract_stream_sync(
        ClientIdentity(client_id, services): ClientIdentity,
        Json(body): Json<ExtractStreamBody>,
    ) -> AppResult<Response> {
        match services.rate_limit.check_rate_limit(&client_id).await {
            RateLimitResult::RateLimited { retry_after } => {
                return Err(Error::RateLimited { retry_after_secs: retry_after });
            }
            RateLimitResult::TimedOut { retry_after, .. } => {
                return Err(Error::RateLimited { retry_after_secs: retry_after });
            }
            RateLimitResult::Allowed { .. } => {}
        }

        let params: ExtractStreamParams = body.into();
        let request = params.into_extraction_request()?;
        let request_id = nanoid!();
        let server = request.server;

        let job = services.job_registry.create(request_id.clone()).await;
        engine::spawn(job, request, services.clone());

        let (mut receiver, snapshot, _token) = services
            .job_registry
            .subscribe(&request_id)
            .await
            .expect("job was just created above");

        let mut last = snapshot;
        loop {
            if let Some(event) = &last
                && event.is_terminal()
            {
                break;
            }

            match receiver.recv().await {
                Ok(event) => last = Some(event),
                Err(_) => break,
            }
        }

        let Some(terminal) = last else {
            return Err(Error::InternalServerErrorWithContext("extraction produced no events".to_string()));
        };

        match terminal.phase {
            Phase::Complete => {
                let descriptor = terminal.result.expect("complete event always carries a result");
                let result = ExtractStreamResult::from_descriptor(descriptor, server, request_id);
                Ok(Json(result).into_response())
            }
            _ => {
                let error = terminal.error.unwrap_or_else(|| crate::server::extraction::model::ExtractionErrorPayload {
                    kind: "internal".to_string(),
                    message: terminal.message.clone(),
                    request_id: request_id.clone(),
                    debug: None,
                });

                let body = ExtractStreamErrorBody {
                    success: false,
                    error: error.message,
                    kind: error.kind,
                    request_id,
                };
                Ok((axum::http::StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response())
            }
        }
    }
}
