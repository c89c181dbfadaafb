use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::CheckOutcome;
use crate::server::store::Summary;

/// A check outcome as sent to clients over HTTP and the websocket.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeDto {
    pub service_id: String,
    pub path: String,
    pub full_http_path: String,
    pub protocol: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub additional_info: Option<String>,
    pub status: String,
    /// Milliseconds.
    pub duration: Option<f64>,
    pub last_check: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl From<&CheckOutcome> for OutcomeDto {
    fn from(outcome: &CheckOutcome) -> Self {
        Self {
            service_id: outcome.service_id.clone(),
            path: outcome.path.clone(),
            full_http_path: outcome.full_http_path.clone(),
            protocol: outcome.protocol.clone(),
            name: outcome.name.clone(),
            host: outcome.host.clone(),
            port: outcome.port,
            additional_info: outcome.additional_info.clone(),
            status: outcome.status.as_str().to_string(),
            duration: outcome.duration_ms(),
            last_check: outcome.last_check,
            error: outcome.error.clone(),
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AllStatusesPush {
    pub count: usize,
    pub services: Vec<OutcomeDto>,
}

impl AllStatusesPush {
    pub fn from_outcomes(outcomes: &[CheckOutcome]) -> Self {
        Self {
            count: outcomes.len(),
            services: outcomes.iter().map(OutcomeDto::from).collect(),
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum WsMessage {
    StatusUpdate(OutcomeDto),
    AllStatuses(AllStatusesPush),
    Summary(Summary),
}

impl WsMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            WsMessage::StatusUpdate(_) => "status_update",
            WsMessage::AllStatuses(_) => "all_statuses",
            WsMessage::Summary(_) => "summary",
        }
    }
}
