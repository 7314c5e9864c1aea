//! Presence read, ETA and confirmation calls.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use domain::models::{ApiEnvelope, Confirmation, EtaUpdate, Identity, LocationSample};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use validator::Validate;

use crate::transport::{OutboundRequest, Transport, TransportError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Unexpected response body: {0}")]
    Decode(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Client for the presence endpoints that are not part of a session.
///
/// A `404` on the read endpoints means "nothing recorded yet" and is returned
/// as an empty result rather than an error.
#[derive(Clone)]
pub struct PresenceApi {
    transport: Arc<dyn Transport>,
    identity: Identity,
}

impl PresenceApi {
    pub fn new(transport: Arc<dyn Transport>, identity: Identity) -> Self {
        Self {
            transport,
            identity,
        }
    }

    /// Most recent sample for an assignment.
    pub async fn latest(&self, assignment_id: &str) -> Result<Option<LocationSample>, ApiError> {
        let id = path_id(assignment_id)?;
        let request = OutboundRequest::get(format!("/presence/latest/{}", id));

        match self.transport.send(request, &self.identity).await {
            Ok(response) => envelope_data(response.body),
            Err(e) if e.is_not_found() => {
                debug!(assignment_id = %id, "No presence sample yet");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Samples recorded since `since`, oldest first, at most `limit`.
    pub async fn trail(
        &self,
        assignment_id: &str,
        since: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> Result<Vec<LocationSample>, ApiError> {
        let id = path_id(assignment_id)?;
        let mut request = OutboundRequest::get(format!("/presence/trail/{}", id));
        if let Some(since) = since {
            request = request.with_query("since", since.to_rfc3339_opts(SecondsFormat::Millis, true));
        }
        if let Some(limit) = limit {
            request = request.with_query("limit", limit);
        }

        match self.transport.send(request, &self.identity).await {
            Ok(response) => Ok(envelope_data(response.body)?.unwrap_or_default()),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Sets the worker's ETA in minutes, or clears it with `None`.
    pub async fn set_eta(&self, assignment_id: &str, eta: Option<u32>) -> Result<(), ApiError> {
        let id = path_id(assignment_id)?;
        let body = EtaUpdate { eta };
        body.validate()
            .map_err(|e| ApiError::Validation(e.to_string()))?;

        let request = OutboundRequest::put_json(format!("/presence/eta/{}", id), &body)?;
        self.transport.send(request, &self.identity).await?;
        debug!(assignment_id = %id, eta = ?eta, "ETA updated");
        Ok(())
    }

    /// Answers a shift confirmation reminder.
    pub async fn confirm(&self, confirmation: &Confirmation) -> Result<(), ApiError> {
        confirmation
            .validate()
            .map_err(|e| ApiError::Validation(e.to_string()))?;

        let request = OutboundRequest::post_json("/presence/confirmations", confirmation)?;
        self.transport.send(request, &self.identity).await?;
        debug!(
            assignment_id = %confirmation.assignment_id,
            response = ?confirmation.response,
            "Shift confirmation sent"
        );
        Ok(())
    }
}

fn path_id(assignment_id: &str) -> Result<&str, ApiError> {
    shared::validation::validate_identifier(assignment_id)
        .map_err(|_| ApiError::Validation("assignment id must not be empty".to_string()))?;
    Ok(assignment_id.trim())
}

/// `data` of an `{ok, data}` envelope. An empty body has no data.
fn envelope_data<T: DeserializeOwned>(body: Value) -> Result<Option<T>, ApiError> {
    if body.is_null() {
        return Ok(None);
    }
    let envelope: ApiEnvelope<T> =
        serde_json::from_value(body).map_err(|e| ApiError::Decode(e.to_string()))?;
    Ok(envelope.data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use domain::models::{ConfirmationResponse, ConfirmationType};
    use serde_json::json;

    use crate::transport::{Method, Payload, RecordingTransport, TransportResponse};

    fn api() -> (PresenceApi, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::new());
        let api = PresenceApi::new(
            transport.clone(),
            Identity::new(Some("token-1".into()), Some("worker-9".into())),
        );
        (api, transport)
    }

    fn respond(transport: &RecordingTransport, body: Value) {
        transport.push_response(Ok(TransportResponse { status: 200, body }));
    }

    fn not_found() -> TransportError {
        TransportError::Server {
            status: 404,
            message: "Not Found".into(),
        }
    }

    #[tokio::test]
    async fn test_latest_decodes_sample() {
        let (api, transport) = api();
        respond(
            &transport,
            json!({
                "ok": true,
                "data": {
                    "assignment_id": "asg-1",
                    "lat": 51.5,
                    "lng": -0.12,
                    "accuracy_m": 8.0,
                    "speed_mps": null,
                    "heading_deg": null,
                    "altitude_m": null,
                    "recorded_at": "2026-03-01T08:00:00Z"
                }
            }),
        );

        let sample = api.latest("asg-1").await.unwrap().unwrap();
        assert_eq!(sample.lat, 51.5);
        assert_eq!(sample.accuracy_m, Some(8.0));
        assert_eq!(sample.speed_mps, None);
        assert_eq!(transport.paths(), vec!["/presence/latest/asg-1"]);
    }

    #[tokio::test]
    async fn test_latest_null_and_not_found_are_empty() {
        let (api, transport) = api();
        respond(&transport, json!({"ok": true, "data": null}));
        transport.push_failure(not_found());

        assert!(api.latest("asg-1").await.unwrap().is_none());
        assert!(api.latest("asg-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_latest_propagates_other_failures() {
        let (api, transport) = api();
        transport.push_failure(TransportError::Server {
            status: 403,
            message: "Forbidden".into(),
        });

        let err = api.latest("asg-1").await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(TransportError::Server { status: 403, .. })));
    }

    #[tokio::test]
    async fn test_trail_query_and_not_found() {
        let (api, transport) = api();
        respond(&transport, json!({"ok": true, "data": []}));
        transport.push_failure(not_found());

        let since = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        assert!(api.trail("asg-1", Some(since), Some(50)).await.unwrap().is_empty());
        assert!(api.trail("asg-1", None, None).await.unwrap().is_empty());

        let requests = transport.requests();
        assert_eq!(
            requests[0].request.query,
            vec![
                ("since".to_string(), "2026-03-01T08:00:00.000Z".to_string()),
                ("limit".to_string(), "50".to_string()),
            ]
        );
        assert!(requests[1].request.query.is_empty());
    }

    #[tokio::test]
    async fn test_set_eta_puts_value_or_null() {
        let (api, transport) = api();
        api.set_eta("asg-1", Some(25)).await.unwrap();
        api.set_eta("asg-1", None).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests[0].request.method, Method::Put);
        assert_eq!(requests[0].request.path, "/presence/eta/asg-1");
        assert_eq!(requests[0].request.payload, Payload::Json(json!({"eta": 25})));
        assert_eq!(requests[1].request.payload, Payload::Json(json!({"eta": null})));
    }

    #[tokio::test]
    async fn test_set_eta_rejects_out_of_range() {
        let (api, transport) = api();
        let err = api.set_eta("asg-1", Some(10_000)).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!(transport.count(), 0);
    }

    #[tokio::test]
    async fn test_confirm_posts_body() {
        let (api, transport) = api();
        let confirmation = Confirmation {
            assignment_id: "asg-1".to_string(),
            confirmation_type: ConfirmationType::TwoHoursBefore,
            response: ConfirmationResponse::Accept,
            notes: None,
        };
        api.confirm(&confirmation).await.unwrap();

        let request = &transport.requests()[0].request;
        assert_eq!(request.path, "/presence/confirmations");
        assert_eq!(
            request.payload,
            Payload::Json(json!({"assignment_id": "asg-1", "type": "2h", "response": "accept"}))
        );
    }

    #[tokio::test]
    async fn test_blank_assignment_id_rejected() {
        let (api, transport) = api();
        assert!(matches!(api.latest("  ").await, Err(ApiError::Validation(_))));
        assert_eq!(transport.count(), 0);
    }
}
