//! HTTP transport
//!
//! Each action is exposed twice: a unary endpoint that returns once the
//! action finished, and a `/stream` variant that pushes status messages as
//! Server-Sent Events followed by exactly one `result` or `error` event.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use bmcd_engine::{
    status_channel, ActionExecutor, ActionRequest, ActionResult, AuthResolver,
    BootDeviceRequest, Code, CollectingSink, DriverRegistry, Error, PowerRequest,
    RequestContext, StatusSink, UserRequest,
};
use futures::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::oneshot;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info_span, Span};

/// Header carrying the caller's correlation id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_REQUEST_ID_LEN: usize = 512;

/// Shared state of the HTTP service
#[derive(Clone)]
pub struct AppState {
    registry: Arc<DriverRegistry>,
    resolver: AuthResolver,
    request_timeout: Option<Duration>,
    status_buffer: usize,
    status_send_timeout: Duration,
}

impl AppState {
    pub fn new(registry: Arc<DriverRegistry>, resolver: AuthResolver) -> Self {
        Self {
            registry,
            resolver,
            request_timeout: None,
            status_buffer: 32,
            status_send_timeout: Duration::from_secs(1),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_status_channel(mut self, buffer: usize, send_timeout: Duration) -> Self {
        self.status_buffer = buffer;
        self.status_send_timeout = send_timeout;
        self
    }

    fn context(&self, headers: &HeaderMap) -> RequestContext {
        let mut ctx = RequestContext::new();
        if let Some(request_id) = request_id_from_headers(headers) {
            ctx = ctx.with_request_id(request_id);
        }
        if let Some(timeout) = self.request_timeout {
            ctx = ctx.with_timeout(timeout);
        }
        ctx
    }

    fn executor(
        &self,
        request: ActionRequest,
        ctx: RequestContext,
        status: Arc<dyn StatusSink>,
    ) -> ActionExecutor {
        let span = request_span(&ctx, &request);
        ActionExecutor::new(request, ctx, self.registry.clone(), status)
            .with_resolver(self.resolver.clone())
            .with_span(span)
    }
}

/// Body of a successful unary response
#[derive(Debug, Serialize, Deserialize)]
pub struct ActionResponse {
    pub result: ActionResult,
    pub status_messages: Vec<String>,
}

/// Body of a failed unary response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: Error,
    pub status_messages: Vec<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/power", post(power))
        .route("/v1/power/stream", post(power_stream))
        .route("/v1/boot-device", post(boot_device))
        .route("/v1/boot-device/stream", post(boot_device_stream))
        .route("/v1/user", post(user))
        .route("/v1/user/stream", post(user_stream))
        .with_state(state)
}

async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "drivers": state.registry.driver_names(),
    }))
}

async fn power(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<PowerRequest>,
) -> Response {
    run_unary(state, &headers, request.into()).await
}

async fn boot_device(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<BootDeviceRequest>,
) -> Response {
    run_unary(state, &headers, request.into()).await
}

async fn user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<UserRequest>,
) -> Response {
    run_unary(state, &headers, request.into()).await
}

async fn power_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<PowerRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    run_stream(state, &headers, request.into())
}

async fn boot_device_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<BootDeviceRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    run_stream(state, &headers, request.into())
}

async fn user_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<UserRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    run_stream(state, &headers, request.into())
}

async fn run_unary(state: AppState, headers: &HeaderMap, request: ActionRequest) -> Response {
    let ctx = state.context(headers);
    let sink = Arc::new(CollectingSink::new());
    let outcome = state.executor(request, ctx, sink.clone()).run().await;
    let status_messages = sink.messages();

    match outcome {
        Ok(result) => (
            StatusCode::OK,
            Json(ActionResponse {
                result,
                status_messages,
            }),
        )
            .into_response(),
        Err(error) => (
            http_status(error.code),
            Json(ErrorResponse {
                error,
                status_messages,
            }),
        )
            .into_response(),
    }
}

/// Run the request on its own task and stream its progress
///
/// The executor is cancelled if the client goes away before the terminal
/// event was produced.
fn run_stream(
    state: AppState,
    headers: &HeaderMap,
    request: ActionRequest,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let cancel = CancellationToken::new();
    let ctx = state
        .context(headers)
        .with_cancellation_token(cancel.clone());
    let (sink, rx) = status_channel(state.status_buffer, state.status_send_timeout);
    let executor = state.executor(request, ctx, Arc::new(sink));

    let (done_tx, done_rx) = oneshot::channel();
    tokio::spawn(async move {
        let _ = done_tx.send(executor.run().await);
    });

    let guard = cancel.drop_guard();
    // SSE fields cannot carry carriage returns
    let statuses = ReceiverStream::new(rx)
        .map(|message| Event::default().event("status").data(message.replace('\r', "")));
    let terminal = stream::once(async move {
        let outcome = done_rx.await;
        guard.disarm();
        match outcome {
            Ok(Ok(result)) => json_event("result", &result),
            Ok(Err(error)) => json_event("error", &error),
            Err(_) => json_event("error", &Error::internal("request ended without an outcome")),
        }
    });

    Sse::new(statuses.chain(terminal).map(Ok::<_, Infallible>)).keep_alive(KeepAlive::default())
}

fn json_event<T: Serialize>(name: &str, value: &T) -> Event {
    Event::default()
        .event(name)
        .json_data(value)
        .unwrap_or_else(|err| {
            error!(error = %err, "Failed to serialize SSE payload");
            Event::default()
                .event("error")
                .data(r#"{"code":"INTERNAL","message":"failed to serialize outcome"}"#)
        })
}

fn request_span(ctx: &RequestContext, request: &ActionRequest) -> Span {
    info_span!(
        "request",
        request_id = %ctx.request_id(),
        category = %request.category(),
    )
}

/// Correlation id supplied by the caller, truncated to 512 bytes
pub fn request_id_from_headers(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(REQUEST_ID_HEADER)?.to_str().ok()?.trim();
    if value.is_empty() {
        return None;
    }

    let mut end = value.len().min(MAX_REQUEST_ID_LEN);
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    Some(value[..end].to_string())
}

/// HTTP status for an error code
pub fn http_status(code: Code) -> StatusCode {
    match code {
        Code::Ok => StatusCode::OK,
        Code::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::REQUEST_TIMEOUT),
        Code::Unknown | Code::Internal | Code::DataLoss => StatusCode::INTERNAL_SERVER_ERROR,
        Code::InvalidArgument | Code::FailedPrecondition | Code::OutOfRange => {
            StatusCode::BAD_REQUEST
        }
        Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::AlreadyExists | Code::Aborted => StatusCode::CONFLICT,
        Code::PermissionDenied => StatusCode::FORBIDDEN,
        Code::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
        Code::Unimplemented => StatusCode::NOT_IMPLEMENTED,
        Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        Code::Unauthenticated => StatusCode::UNAUTHORIZED,
    }
}
