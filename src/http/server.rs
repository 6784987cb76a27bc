//! HTTP server exposing probes, metrics and user creation

use super::validation::validate_create_user;
use crate::broker::publisher::EventPublisher;
use crate::config::millis;
use crate::error::{FieldErrors, ServiceError, ServiceResult};
use crate::observability::metrics::metrics;
use crate::request_span;
use crate::service::health::HealthService;
use crate::service::user::UserService;
use serde::Serialize;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, Instrument};
use warp::http::StatusCode;
use warp::reply::{Reply, Response};
use warp::{Filter, Rejection};

/// Largest accepted request body
const MAX_BODY_BYTES: u64 = 16 * 1024;

/// Standard error envelope returned by the API
#[derive(Debug, Serialize)]
struct ApiError<T: Serialize> {
    message: &'static str,
    data: Option<T>,
}

#[derive(Debug, Serialize)]
struct ValidationErrors {
    errors: FieldErrors,
}

#[derive(Debug, Serialize)]
struct LivenessResponse {
    alive: bool,
    timestamp: u64,
}

#[derive(Debug, Serialize)]
struct ReadinessResponse {
    status: &'static str,
    details: BTreeMap<String, String>,
}

fn json_response<T: Serialize>(body: &T, status: StatusCode) -> Response {
    warp::reply::with_status(warp::reply::json(body), status).into_response()
}

fn bad_request(errors: FieldErrors) -> Response {
    json_response(
        &ApiError {
            message: "Bad Request",
            data: Some(ValidationErrors { errors }),
        },
        StatusCode::BAD_REQUEST,
    )
}

fn plain_error(message: &'static str, status: StatusCode) -> Response {
    json_response(
        &ApiError::<()> {
            message,
            data: None,
        },
        status,
    )
}

/// Map a service error onto the API error envelope
pub fn error_response(error: ServiceError) -> Response {
    match error {
        ServiceError::Validation(errors) => bad_request(errors),
        e if e.is_unavailable() => {
            plain_error("Service Unavailable", StatusCode::SERVICE_UNAVAILABLE)
        }
        e => {
            error!(error = %e.sanitized_message(), "Request failed");
            plain_error("Internal Server Error", StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// All routes served by the user service
pub fn routes<P>(
    users: Arc<UserService<P>>,
    health: Arc<HealthService>,
) -> impl Filter<Extract = (Response,), Error = Infallible> + Clone
where
    P: EventPublisher + 'static,
{
    // GET /livez - liveness probe
    let livez = warp::path("livez")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| {
            json_response(
                &LivenessResponse {
                    alive: true,
                    timestamp: current_timestamp(),
                },
                StatusCode::OK,
            )
        });

    // GET /readyz - readiness probe
    let readyz = warp::path("readyz")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(health))
        .and_then(readyz_handler);

    // GET /metrics - metrics snapshot
    let metrics_route = warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| json_response(&metrics().get_metrics(), StatusCode::OK));

    // POST /users - create a user and announce it
    let create_user = warp::path("users")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::bytes())
        .and(with_state(users))
        .and_then(create_user_handler::<P>);

    livez
        .or(readyz)
        .unify()
        .or(metrics_route)
        .unify()
        .or(create_user)
        .unify()
        .recover(handle_rejection)
        .unify()
        .with(warp::log::custom(|info| {
            info!(
                method = %info.method(),
                path = info.path(),
                status = info.status().as_u16(),
                elapsed_ms = millis(info.elapsed()),
                "HTTP request"
            );
        }))
        .map(|logged| Reply::into_response(logged))
}

fn with_state<T: Send + Sync + 'static>(
    state: Arc<T>,
) -> impl Filter<Extract = (Arc<T>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&state))
}

async fn readyz_handler(health: Arc<HealthService>) -> Result<Response, Rejection> {
    let readiness = health.readiness().await;
    let details = readiness
        .results
        .iter()
        .map(|result| {
            let status = if result.healthy { "ok" } else { "disconnected" };
            (result.component.clone(), status.to_string())
        })
        .collect();

    let (status, code) = if readiness.ready {
        ("ready", StatusCode::OK)
    } else {
        ("unready", StatusCode::SERVICE_UNAVAILABLE)
    };

    Ok(json_response(&ReadinessResponse { status, details }, code))
}

async fn create_user_handler<P: EventPublisher + 'static>(
    body: warp::hyper::body::Bytes,
    users: Arc<UserService<P>>,
) -> Result<Response, Rejection> {
    let span = request_span!(route = "create_user");
    async move {
        let input = match validate_create_user(&body) {
            Ok(input) => input,
            Err(errors) => return Ok(bad_request(errors)),
        };

        match users.create(input).await {
            Ok(user) => Ok(json_response(&user, StatusCode::OK)),
            Err(e) => Ok(error_response(e)),
        }
    }
    .instrument(span)
    .await
}

async fn handle_rejection(rejection: Rejection) -> Result<Response, Infallible> {
    let response = if rejection.is_not_found() {
        plain_error("Not Found", StatusCode::NOT_FOUND)
    } else if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        plain_error("Payload Too Large", StatusCode::PAYLOAD_TOO_LARGE)
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        plain_error("Method Not Allowed", StatusCode::METHOD_NOT_ALLOWED)
    } else {
        plain_error("Bad Request", StatusCode::BAD_REQUEST)
    };
    Ok(response)
}

/// Bind `addr` and serve until `shutdown` flips to true.
///
/// Returns the bound address and the server task. In-flight requests drain
/// after the signal; callers bound the drain with their own timeout.
pub fn start_server<F>(
    addr: SocketAddr,
    routes: F,
    mut shutdown: watch::Receiver<bool>,
) -> ServiceResult<(SocketAddr, JoinHandle<()>)>
where
    F: Filter<Extract = (Response,), Error = Infallible> + Clone + Send + Sync + 'static,
{
    let signal = async move {
        while !*shutdown.borrow_and_update() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }
        info!("HTTP server draining");
    };

    let (bound, server) = warp::serve(routes)
        .try_bind_with_graceful_shutdown(addr, signal)
        .map_err(|e| ServiceError::internal_error(format!("Failed to bind {addr}: {e}")))?;

    info!(address = %bound, "HTTP server started");
    Ok((bound, tokio::spawn(server)))
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::connection::BrokerError;

    #[test]
    fn test_error_response_statuses() {
        let response = error_response(ServiceError::Broker(BrokerError::PublishTimeout {
            queue: "q".to_string(),
        }));
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = error_response(ServiceError::Validation(FieldErrors::new()));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = error_response(ServiceError::internal_error("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
