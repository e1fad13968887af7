//! Per-request action execution
//!
//! An [`ActionExecutor`] takes one request from authentication to a single
//! terminal outcome:
//!
//! 1. Resolve credentials (failure ends the request before any driver runs)
//! 2. Validate host and payload
//! 3. Ask the registry for candidate drivers
//! 4. Try candidates strictly one at a time, in registry order, until one
//!    succeeds; failures are recorded and the next candidate is tried
//! 5. If every candidate failed, return the aggregate error
//!
//! Cancellation or deadline expiry of the request context at any point
//! stops execution immediately; untried candidates are skipped.

use std::sync::Arc;

use tracing::{info, info_span, warn, Instrument, Span};

use crate::auth::{AuthResolver, ResolvedAuth};
use crate::context::RequestContext;
use crate::driver::Driver;
use crate::error::{Code, Error, Result};
use crate::registry::DriverRegistry;
use crate::request::{ActionRequest, ActionResult};
use crate::status::StatusSink;

/// Message of the aggregate error returned when every driver failed
pub const ALL_DRIVERS_FAILED: &str = "all drivers failed";

/// Orchestrates one request
///
/// Built at request entry and consumed by [`ActionExecutor::run`]; nothing
/// in it is shared with other requests except the read-only registry.
///
/// # Example
///
/// ```ignore
/// let executor = ActionExecutor::new(request, ctx, registry, status_sink)
///     .with_resolver(resolver);
/// let result = executor.run().await?;
/// ```
pub struct ActionExecutor {
    request: ActionRequest,
    ctx: RequestContext,
    registry: Arc<DriverRegistry>,
    status: Arc<dyn StatusSink>,
    resolver: AuthResolver,
    span: Span,
}

/// A failed attempt by one driver
struct Failure {
    driver: String,
    error: Error,
}

impl ActionExecutor {
    pub fn new(
        request: ActionRequest,
        ctx: RequestContext,
        registry: Arc<DriverRegistry>,
        status: Arc<dyn StatusSink>,
    ) -> Self {
        let span = info_span!(
            "action",
            request_id = %ctx.request_id(),
            category = %request.category(),
        );
        Self {
            request,
            ctx,
            registry,
            status,
            resolver: AuthResolver::new(),
            span,
        }
    }

    /// Use a resolver that can look up stored credentials
    pub fn with_resolver(mut self, resolver: AuthResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Log into `span` instead of the default per-request span
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Run the request to its terminal outcome
    pub async fn run(self) -> Result<ActionResult> {
        let span = self.span.clone();
        self.execute().instrument(span).await
    }

    async fn execute(self) -> Result<ActionResult> {
        let payload = self.request.payload();

        let auth = match self.resolve_auth().await {
            Ok(auth) => auth,
            Err(err) => {
                warn!(code = %err.code, error = %err.message, "Authentication failed");
                self.send_status(format!("authentication failed: {}", err.message))
                    .await;
                return Err(err);
            }
        };
        info!(host = %auth.host, username = %auth.credentials.username, "Resolved credentials");

        if auth.host.is_empty() {
            return Err(Error::invalid_argument("host is required"));
        }
        payload.validate()?;

        let category = payload.category();
        let candidates = self.registry.candidates(category);
        if candidates.is_empty() {
            warn!(category = %category, "No capable driver registered");
            return Err(Error::invalid_argument(format!(
                "no driver supports {} actions",
                category
            )));
        }

        let mut failures = Vec::new();
        for (index, driver) in candidates.iter().enumerate() {
            if let Some(err) = self.ctx.err() {
                return Err(self.abort(err).await);
            }

            self.send_status(format!("{}: attempting via {}", payload, driver.name()))
                .await;
            info!(
                driver = driver.name(),
                attempt = index + 1,
                candidates = candidates.len(),
                "Attempting driver"
            );

            let attempt = tokio::select! {
                biased;
                err = self.ctx.done() => return Err(self.abort(err).await),
                result = driver.execute(&self.ctx, &auth.host, &auth.credentials, &payload) => result,
            };

            match attempt {
                Ok(result) => {
                    info!(
                        driver = driver.name(),
                        outcome = ?result.outcome,
                        failed_attempts = failures.len(),
                        "Driver succeeded"
                    );
                    self.send_status(format!("{}: succeeded via {}", payload, driver.name()))
                        .await;
                    return Ok(result.with_details(failure_details(&failures)));
                }
                Err(err) => {
                    // A driver honouring the context reports its end as an
                    // ordinary error; that must still stop the fallback.
                    if let Some(ctx_err) = self.ctx.err() {
                        return Err(self.abort(ctx_err).await);
                    }
                    if err.code.is_context_end() {
                        return Err(self.abort(err).await);
                    }

                    warn!(
                        driver = driver.name(),
                        code = %err.code,
                        error = %err.message,
                        "Driver failed"
                    );
                    let next = candidates.get(index + 1);
                    self.send_status(failure_status(driver.as_ref(), &err, next))
                        .await;
                    failures.push(Failure {
                        driver: driver.name().to_string(),
                        error: err,
                    });
                }
            }
        }

        let err = exhausted(&failures);
        warn!(
            code = %err.code,
            attempts = failures.len(),
            "All drivers failed"
        );
        self.send_status(format!("{}: {}", payload, ALL_DRIVERS_FAILED))
            .await;
        Err(err)
    }

    async fn resolve_auth(&self) -> Result<ResolvedAuth> {
        tokio::select! {
            biased;
            err = self.ctx.done() => Err(err),
            auth = self.resolver.resolve(self.request.authn()) => auth,
        }
    }

    async fn abort(&self, err: Error) -> Error {
        warn!(code = %err.code, "Request ended before completion");
        self.send_status(format!("aborted: {}", err.message)).await;
        err
    }

    async fn send_status(&self, message: String) {
        self.status.send(message).await;
    }
}

fn failure_status(driver: &dyn Driver, err: &Error, next: Option<&Arc<dyn Driver>>) -> String {
    match next {
        Some(next) => format!(
            "{} failed: {}; falling back to {}",
            driver.name(),
            err.message,
            next.name()
        ),
        None => format!("{} failed: {}", driver.name(), err.message),
    }
}

/// Aggregate error once every candidate has failed
///
/// The code is `Unavailable` when every failure was connection-level
/// (no BMC could be reached at all) and `Internal` otherwise.
fn exhausted(failures: &[Failure]) -> Error {
    let code = if failures
        .iter()
        .all(|failure| failure.error.code == Code::Unavailable)
    {
        Code::Unavailable
    } else {
        Code::Internal
    };

    Error::new(code, ALL_DRIVERS_FAILED).with_details(failure_details(failures))
}

fn failure_details(failures: &[Failure]) -> Vec<String> {
    failures
        .iter()
        .map(|failure| format!("{}: {}", failure.driver, failure.error.message))
        .collect()
}

impl std::fmt::Debug for ActionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionExecutor")
            .field("request_id", &self.ctx.request_id())
            .field("category", &self.request.category())
            .field("registry", &self.registry)
            .finish()
    }
}
