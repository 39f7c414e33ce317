// Copyright (c) James Kassemi, SC, US. All rights reserved.
//! Prometheus metrics for the vote path. hyper v1.+
use core_types::{ResetScope, Team};
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use log::{error, warn};
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use std::error::Error;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Why a vote request did not reach the counter step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    Validation,
    Quota,
    Store,
}

impl RejectReason {
    fn label(self) -> &'static str {
        match self {
            RejectReason::Validation => "validation",
            RejectReason::Quota => "quota",
            RejectReason::Store => "store",
        }
    }
}

/// Advisory writes whose failure is swallowed after a vote commits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SideChannel {
    Statistics,
    Snapshot,
    Broadcast,
    QuotaCompensation,
}

impl SideChannel {
    fn label(self) -> &'static str {
        match self {
            SideChannel::Statistics => "statistics",
            SideChannel::Snapshot => "snapshot",
            SideChannel::Broadcast => "broadcast",
            SideChannel::QuotaCompensation => "quota_compensation",
        }
    }
}

pub struct Metrics {
    registry: Registry,
    votes_accepted: IntCounterVec,
    votes_rejected: IntCounterVec,
    side_channel_failures: IntCounterVec,
    resets: IntCounterVec,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let votes_accepted = IntCounterVec::new(
            Opts::new("tally_votes_accepted_total", "Votes applied to a counter"),
            &["team"],
        )?;
        let votes_rejected = IntCounterVec::new(
            Opts::new(
                "tally_votes_rejected_total",
                "Vote requests rejected before the counter step",
            ),
            &["reason"],
        )?;
        let side_channel_failures = IntCounterVec::new(
            Opts::new(
                "tally_side_channel_failures_total",
                "Swallowed failures of advisory writes after a committed mutation",
            ),
            &["channel"],
        )?;
        let resets = IntCounterVec::new(
            Opts::new("tally_resets_total", "Privileged resets by scope and outcome"),
            &["scope", "outcome"],
        )?;
        registry.register(Box::new(votes_accepted.clone()))?;
        registry.register(Box::new(votes_rejected.clone()))?;
        registry.register(Box::new(side_channel_failures.clone()))?;
        registry.register(Box::new(resets.clone()))?;
        Ok(Self {
            registry,
            votes_accepted,
            votes_rejected,
            side_channel_failures,
            resets,
        })
    }

    pub fn inc_vote_accepted(&self, team: Team) {
        self.votes_accepted.with_label_values(&[team.as_str()]).inc();
    }

    pub fn inc_vote_rejected(&self, reason: RejectReason) {
        self.votes_rejected.with_label_values(&[reason.label()]).inc();
    }

    pub fn inc_side_channel_failure(&self, channel: SideChannel) {
        self.side_channel_failures
            .with_label_values(&[channel.label()])
            .inc();
    }

    pub fn inc_reset(&self, scope: ResetScope, outcome: &str) {
        self.resets
            .with_label_values(&[scope.as_str(), outcome])
            .inc();
    }

    pub fn votes_accepted(&self, team: Team) -> u64 {
        self.votes_accepted.with_label_values(&[team.as_str()]).get()
    }

    pub fn votes_rejected(&self, reason: RejectReason) -> u64 {
        self.votes_rejected.with_label_values(&[reason.label()]).get()
    }

    pub fn side_channel_failures(&self, channel: SideChannel) -> u64 {
        self.side_channel_failures
            .with_label_values(&[channel.label()])
            .get()
    }

    /// Text exposition of every registered family.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(err) = encoder.encode(&self.registry.gather(), &mut buffer) {
            warn!("failed to encode metrics: {err}");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }

    async fn handle_metrics(
        &self,
        _req: Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, std::convert::Infallible> {
        let mut response = Response::new(Full::new(Bytes::from(self.render())));
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4"),
        );
        Ok(response)
    }

    pub async fn serve(
        self: &Arc<Self>,
        listener: TcpListener,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        loop {
            let (socket, _) = listener.accept().await?;
            let io = TokioIo::new(socket);
            let metrics = self.clone();
            let service = service_fn(move |req| {
                let metrics = metrics.clone();
                async move { metrics.handle_metrics(req).await }
            });
            tokio::spawn(async move {
                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!("error serving metrics connection: {err:?}");
                }
            });
        }
    }
}
