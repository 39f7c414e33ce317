// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! HTTP surface of the tally. hyper v1.+
//!
//! Routing is generic over the request body so the same handlers serve
//! network connections and in-process tests.

use std::{convert::Infallible, error::Error, sync::Arc};

use chrono::SecondsFormat;
use core_types::{LastVote, ResetScope, VoteReceipt};
use http_body_util::{BodyExt, Full, Limited, StreamBody, combinators::UnsyncBoxBody};
use hyper::{
    HeaderMap, Method, Request, Response, StatusCode,
    body::{Body, Bytes, Frame},
    header::{CACHE_CONTROL, CONTENT_TYPE, HeaderValue, SET_COOKIE},
    server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use ledger::{Ballot, LedgerController, LedgerError, ResetCoordinator, ResetOutcome, VoteDay};
use log::{debug, error, info, warn};
use metrics::{Metrics, RejectReason};
use realtime::{ChannelHub, ChannelMessage};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_stream::{
    StreamExt,
    wrappers::{BroadcastStream, errors::BroadcastStreamRecvError},
};

use crate::{
    admin::{ADMIN_COOKIE, AdminSessions},
    identity::{self, ResolvedIdentity},
};

pub type ResponseBody = UnsyncBoxBody<Bytes, Infallible>;
pub type HttpResponse = Response<ResponseBody>;

const MAX_BODY_BYTES: usize = 16 * 1024;

/// Shared state behind every route.
pub struct AppState {
    ledger: Arc<LedgerController>,
    hub: Arc<ChannelHub>,
    resets: ResetCoordinator,
    sessions: AdminSessions,
    metrics: Arc<Metrics>,
    secure_cookies: bool,
}

#[derive(Serialize)]
struct ClickResponse {
    #[serde(flatten)]
    receipt: VoteReceipt,
    success: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LastVoteResponse {
    last_vote: Option<LastVote>,
}

impl AppState {
    pub fn new(
        ledger: Arc<LedgerController>,
        hub: Arc<ChannelHub>,
        sessions: AdminSessions,
        secure_cookies: bool,
    ) -> Self {
        Self {
            resets: ResetCoordinator::new(ledger.clone()),
            metrics: ledger.metrics(),
            ledger,
            hub,
            sessions,
            secure_cookies,
        }
    }

    pub fn ledger(&self) -> &Arc<LedgerController> {
        &self.ledger
    }

    pub fn sessions(&self) -> &AdminSessions {
        &self.sessions
    }

    fn is_admin(&self, headers: &HeaderMap) -> bool {
        identity::cookie_value(headers, ADMIN_COOKIE)
            .map(|token| self.sessions.is_valid(token))
            .unwrap_or(false)
    }

    async fn click<B>(&self, req: Request<B>) -> HttpResponse
    where
        B: Body,
        B::Error: Into<Box<dyn Error + Send + Sync>>,
    {
        let resolved = identity::resolve(req.headers());
        let origin = identity::origin_address(req.headers());
        let privileged = self.is_admin(req.headers());

        let body = match read_json(req).await {
            Ok(body) => body,
            Err(response) => return self.with_identity(response, &resolved),
        };
        let fields = integer_field(&body, "counterId")
            .ok_or("counterId must be an integer")
            .and_then(|counter_id| {
                integer_field(&body, "delta")
                    .map(|delta| (counter_id, delta))
                    .ok_or("delta must be an integer")
            });
        let (counter_id, delta) = match fields {
            Ok(fields) => fields,
            Err(message) => {
                self.metrics.inc_vote_rejected(RejectReason::Validation);
                return self.with_identity(
                    error_response(StatusCode::BAD_REQUEST, message),
                    &resolved,
                );
            }
        };

        let ballot = Ballot {
            identity: &resolved.identity,
            origin_address: &origin,
            counter_id,
            delta,
            privileged,
        };
        let response = match self.ledger.cast_vote(ballot).await {
            Ok(receipt) => json_response(
                StatusCode::OK,
                &ClickResponse {
                    receipt,
                    success: true,
                },
            ),
            Err(err) => vote_error_response(&err),
        };
        self.with_identity(response, &resolved)
    }

    async fn counters(&self, headers: &HeaderMap) -> HttpResponse {
        let resolved = identity::resolve(headers);
        let response = match self.ledger.read_state(&resolved.identity).await {
            Ok(state) => json_response(StatusCode::OK, &state),
            Err(err) => {
                error!("failed to read counters: {err}");
                error_response(StatusCode::SERVICE_UNAVAILABLE, "Failed to fetch counters")
            }
        };
        self.with_identity(response, &resolved)
    }

    async fn reset<B>(&self, req: Request<B>) -> HttpResponse
    where
        B: Body,
        B::Error: Into<Box<dyn Error + Send + Sync>>,
    {
        if !self.is_admin(req.headers()) {
            return unauthorized();
        }
        let body = match read_json(req).await {
            Ok(body) => body,
            Err(response) => return response,
        };
        let Some(kind) = body.get("type").and_then(Value::as_str) else {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Type is required and must be a string",
            );
        };
        let Ok(scope) = kind.parse::<ResetScope>() else {
            return error_response(StatusCode::BAD_REQUEST, "Invalid reset type");
        };

        let report = self.resets.reset(scope).await;
        if report.is_complete() {
            return json_response(
                StatusCode::OK,
                &json!({ "success": true, "message": report.message() }),
            );
        }
        let failed_steps: Vec<_> = report
            .failed_steps
            .iter()
            .map(|failure| failure.step.as_str())
            .collect();
        json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &json!({
                "success": false,
                "outcome": report.outcome.as_str(),
                "message": report.message(),
                "failedSteps": failed_steps,
                "countersZeroed": report.counters_zeroed,
                "quotasCleared": report.quotas_cleared,
                "changed": report.outcome != ResetOutcome::Failed,
            }),
        )
    }

    async fn login<B>(&self, req: Request<B>) -> HttpResponse
    where
        B: Body,
        B::Error: Into<Box<dyn Error + Send + Sync>>,
    {
        let body = match read_json(req).await {
            Ok(body) => body,
            Err(response) => return response,
        };
        let Some(password) = body.get("password").and_then(Value::as_str) else {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Password is required and must be a string",
            );
        };
        match self.sessions.login(password) {
            Some(token) => {
                info!("admin session opened");
                let mut response = json_response(StatusCode::OK, &json!({ "success": true }));
                let cookie = identity::set_cookie(
                    ADMIN_COOKIE,
                    &token,
                    self.sessions.ttl().as_secs(),
                    self.secure_cookies,
                );
                append_cookie(&mut response, &cookie);
                response
            }
            None => {
                warn!("rejected admin login attempt");
                error_response(StatusCode::UNAUTHORIZED, "Invalid password")
            }
        }
    }

    fn auth_status(&self, headers: &HeaderMap) -> HttpResponse {
        json_response(
            StatusCode::OK,
            &json!({ "authenticated": self.is_admin(headers) }),
        )
    }

    fn logout(&self, headers: &HeaderMap) -> HttpResponse {
        if let Some(token) = identity::cookie_value(headers, ADMIN_COOKIE) {
            self.sessions.revoke(token);
        }
        let mut response = json_response(StatusCode::OK, &json!({ "success": true }));
        append_cookie(
            &mut response,
            &identity::set_cookie(ADMIN_COOKIE, "", 0, self.secure_cookies),
        );
        response
    }

    async fn admin_stats(&self, headers: &HeaderMap) -> HttpResponse {
        if !self.is_admin(headers) {
            return unauthorized();
        }
        let day = VoteDay::today(self.ledger.clock().as_ref());
        match self.ledger.stats().team_votes(day).await {
            Ok(stats) => json_response(StatusCode::OK, &stats),
            Err(err) => {
                error!("failed to read admin stats: {err}");
                error_response(StatusCode::SERVICE_UNAVAILABLE, "Failed to fetch admin stats")
            }
        }
    }

    async fn stats(&self) -> HttpResponse {
        match self.ledger.stats().summary().await {
            Ok(summary) => json_response(StatusCode::OK, &summary),
            Err(err) => {
                error!("failed to read stats: {err}");
                error_response(StatusCode::SERVICE_UNAVAILABLE, "Failed to fetch stats")
            }
        }
    }

    async fn last_vote(&self) -> HttpResponse {
        match self.ledger.last_vote().await {
            Ok(last_vote) => json_response(StatusCode::OK, &LastVoteResponse { last_vote }),
            Err(err) => {
                error!("failed to read last vote: {err}");
                error_response(StatusCode::SERVICE_UNAVAILABLE, "Failed to fetch last vote")
            }
        }
    }

    async fn health(&self) -> HttpResponse {
        let store_ok = match self.ledger.store().ping().await {
            Ok(()) => true,
            Err(err) => {
                warn!("health check: store unreachable: {err}");
                false
            }
        };
        let realtime_ok = self
            .ledger
            .publisher()
            .status_handle()
            .snapshot()
            .is_healthy();
        let healthy = store_ok && realtime_ok;
        let label = |ok: bool| if ok { "healthy" } else { "unhealthy" };
        let status = if healthy {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
        json_response(
            status,
            &json!({
                "status": if healthy { "healthy" } else { "degraded" },
                "timestamp": self
                    .ledger
                    .clock()
                    .now()
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
                "services": {
                    "store": label(store_ok),
                    "realtime": label(realtime_ok),
                },
                "subscribers": self.hub.subscriber_count(),
            }),
        )
    }

    /// Server-sent events view of the broadcast channel. Each `update` event
    /// is forwarded as it is published; a subscriber that falls behind gets a
    /// `resync` event and should refetch `/api/counters`.
    fn stream(&self) -> HttpResponse {
        let channel = self.hub.name().to_string();
        let opened = tokio_stream::once(Bytes::from(format!(": subscribed to {channel}\n\n")));
        let updates = BroadcastStream::new(self.hub.subscribe()).filter_map(sse_frame);
        let frames = opened
            .chain(updates)
            .map(|bytes| Ok::<_, Infallible>(Frame::data(bytes)));

        let mut response = Response::new(StreamBody::new(frames).boxed_unsync());
        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        response
    }

    fn metrics(&self) -> HttpResponse {
        let mut response = Response::new(full(self.metrics.render()));
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4"),
        );
        response
    }

    fn with_identity(
        &self,
        mut response: HttpResponse,
        resolved: &ResolvedIdentity,
    ) -> HttpResponse {
        if let Some(cookie) = resolved.set_cookie(self.secure_cookies) {
            append_cookie(&mut response, &cookie);
        }
        response
    }
}

/// Routes one request.
pub async fn handle<B>(state: Arc<AppState>, req: Request<B>) -> Result<HttpResponse, Infallible>
where
    B: Body,
    B::Error: Into<Box<dyn Error + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let response = match (method, path.as_str()) {
        (Method::POST, "/api/click") => state.click(req).await,
        (Method::GET, "/api/counters") => state.counters(req.headers()).await,
        (Method::POST, "/api/admin/reset") => state.reset(req).await,
        (Method::POST, "/api/admin/auth") => state.login(req).await,
        (Method::GET, "/api/admin/auth") => state.auth_status(req.headers()),
        (Method::DELETE, "/api/admin/auth") => state.logout(req.headers()),
        (Method::GET, "/api/admin/stats") => state.admin_stats(req.headers()).await,
        (Method::GET, "/api/stats") => state.stats().await,
        (Method::GET, "/api/last-vote") => state.last_vote().await,
        (Method::GET, "/api/health") => state.health().await,
        (Method::GET, "/api/stream") => state.stream(),
        (Method::GET, "/metrics") => state.metrics(),
        _ => error_response(StatusCode::NOT_FOUND, "Not found"),
    };
    Ok(response)
}

pub async fn serve(
    state: Arc<AppState>,
    listener: TcpListener,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    loop {
        let (socket, _) = listener.accept().await?;
        let io = TokioIo::new(socket);
        let state = state.clone();
        let service = service_fn(move |req| handle(state.clone(), req));
        tokio::spawn(async move {
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                error!("error serving api connection: {err:?}");
            }
        });
    }
}

fn vote_error_response(err: &LedgerError) -> HttpResponse {
    match err {
        LedgerError::InvalidCounter { .. } => error_response(
            StatusCode::BAD_REQUEST,
            "Invalid counterId. Must be 1, 2, or 3",
        ),
        LedgerError::InvalidDelta { .. } => {
            error_response(StatusCode::BAD_REQUEST, "Invalid delta. Must be 1 or -1")
        }
        LedgerError::QuotaExceeded { .. } => json_response(
            StatusCode::TOO_MANY_REQUESTS,
            &json!({
                "error": "Daily vote limit reached",
                "votesRemaining": err.votes_remaining().unwrap_or(0),
            }),
        ),
        LedgerError::StoreUnavailable(_) => {
            error!("vote failed: {err}");
            error_response(StatusCode::SERVICE_UNAVAILABLE, "Failed to process click")
        }
    }
}

/// Reads a JSON request body, answering 400 for the wrong content type or a
/// body that does not parse.
async fn read_json<B>(req: Request<B>) -> Result<Value, HttpResponse>
where
    B: Body,
    B::Error: Into<Box<dyn Error + Send + Sync>>,
{
    let is_json = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.contains("application/json"))
        .unwrap_or(false);
    if !is_json {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Content-Type must be application/json",
        ));
    }

    let bytes = match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                "Invalid JSON in request body",
            ));
        }
    };
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Null) => Err(error_response(
            StatusCode::BAD_REQUEST,
            "Request body is required",
        )),
        Ok(value) => Ok(value),
        Err(_) => Err(error_response(
            StatusCode::BAD_REQUEST,
            "Invalid JSON in request body",
        )),
    }
}

/// Integer-valued JSON number; `2.0` counts, `2.5` and `"2"` do not.
fn integer_field(body: &Value, name: &str) -> Option<i64> {
    let value = body.get(name)?;
    if let Some(int) = value.as_i64() {
        return Some(int);
    }
    value
        .as_f64()
        .filter(|float| float.is_finite() && float.fract() == 0.0)
        .filter(|float| *float >= i64::MIN as f64 && *float <= i64::MAX as f64)
        .map(|float| float as i64)
}

fn json_response(status: StatusCode, body: &impl Serialize) -> HttpResponse {
    let payload = match serde_json::to_vec(body) {
        Ok(payload) => payload,
        Err(err) => {
            error!("failed to encode response body: {err}");
            let mut response = Response::new(full(Bytes::from_static(
                br#"{"error":"Internal error"}"#,
            )));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            return response;
        }
    };
    let mut response = Response::new(full(payload));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn full(bytes: impl Into<Bytes>) -> ResponseBody {
    Full::new(bytes.into()).boxed_unsync()
}

fn sse_frame(received: Result<ChannelMessage, BroadcastStreamRecvError>) -> Option<Bytes> {
    match received {
        Ok(message) => match serde_json::to_string(&message.data) {
            Ok(data) => Some(Bytes::from(format!(
                "event: {}\ndata: {data}\n\n",
                message.name
            ))),
            Err(err) => {
                warn!("dropping unencodable {} event: {err}", message.name);
                None
            }
        },
        Err(BroadcastStreamRecvError::Lagged(missed)) => {
            debug!("stream subscriber lagged, {missed} events dropped");
            Some(Bytes::from(format!(
                "event: resync\ndata: {{\"missed\":{missed}}}\n\n"
            )))
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> HttpResponse {
    json_response(status, &json!({ "error": message }))
}

fn unauthorized() -> HttpResponse {
    error_response(StatusCode::UNAUTHORIZED, "Unauthorized")
}

fn append_cookie(response: &mut HttpResponse, cookie: &str) {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            response.headers_mut().append(SET_COOKIE, value);
        }
        Err(err) => warn!("dropping unencodable cookie: {err}"),
    }
}
