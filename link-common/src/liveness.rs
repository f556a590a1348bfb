use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::warn;

/// Liveness reporting for a long running loop.
///
/// The loop calls `report_healthy` on every iteration. The probe fails if the loop
/// has never reported, or if its last report is older than the deadline: a loop
/// stuck on a dependency stops reporting and the process gets restarted.
#[derive(Clone)]
pub struct Liveness {
    name: String,
    deadline: Duration,
    last_report: Arc<RwLock<Option<Instant>>>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum LivenessStatus {
    /// The loop has not reported yet
    Starting,
    /// Reported within the deadline
    Healthy,
    /// Last report is older than the deadline
    Stalled,
}

impl IntoResponse for LivenessStatus {
    fn into_response(self) -> Response {
        let body = format!("{:?}", self);
        match self {
            LivenessStatus::Healthy => (StatusCode::OK, body),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, body),
        }
        .into_response()
    }
}

impl Liveness {
    pub fn new(name: &str, deadline: Duration) -> Self {
        Self {
            name: name.to_owned(),
            deadline,
            last_report: Default::default(),
        }
    }

    pub fn report_healthy(&self) {
        match self.last_report.write() {
            Ok(mut last_report) => *last_report = Some(Instant::now()),
            // Poisoned lock: the probe will keep failing and the process restart
            Err(_) => warn!("poisoned {} liveness lock", self.name),
        }
    }

    pub fn get_status(&self) -> LivenessStatus {
        let last_report = match self.last_report.read() {
            Ok(last_report) => *last_report,
            Err(_) => return LivenessStatus::Stalled,
        };

        let status = match last_report {
            None => LivenessStatus::Starting,
            Some(at) if at.elapsed() <= self.deadline => LivenessStatus::Healthy,
            Some(_) => LivenessStatus::Stalled,
        };

        if status != LivenessStatus::Healthy {
            warn!("{} liveness check failed: {:?}", self.name, status);
        }
        status
    }
}
