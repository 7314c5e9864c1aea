//! Location domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::identity::AssignmentContext;

/// Provider tag used when the reading came from the device's satellite receiver.
pub const DEFAULT_PROVIDER: &str = "device_gnss";

/// A single resolved read from the device position sensor.
///
/// Optional kinematic fields are `None` when the sensor omitted them. They are
/// never defaulted to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionReading {
    pub lat: f64,
    pub lng: f64,
    pub accuracy_m: Option<f64>,
    pub speed_mps: Option<f64>,
    pub heading_deg: Option<f64>,
    pub altitude_m: Option<f64>,
    #[serde(default)]
    pub is_mock: bool,
    pub timestamp: DateTime<Utc>,
}

impl PositionReading {
    /// A bare fix with no kinematic metadata, stamped now.
    pub fn at(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            accuracy_m: None,
            speed_mps: None,
            heading_deg: None,
            altitude_m: None,
            is_mock: false,
            timestamp: Utc::now(),
        }
    }
}

/// One telemetry sample as sent to `POST /telemetry`.
///
/// Absent optional fields serialize as `null` so the server can tell an
/// omitted reading apart from a true zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct LocationSample {
    #[serde(default)]
    pub company_id: String,

    #[serde(default)]
    pub assignment_id: String,

    #[validate(custom(function = "shared::validation::validate_latitude"))]
    pub lat: f64,

    #[validate(custom(function = "shared::validation::validate_longitude"))]
    pub lng: f64,

    #[validate(custom(function = "shared::validation::validate_accuracy"))]
    pub accuracy_m: Option<f64>,

    #[validate(custom(function = "shared::validation::validate_speed"))]
    pub speed_mps: Option<f64>,

    #[validate(custom(function = "shared::validation::validate_heading"))]
    pub heading_deg: Option<f64>,

    pub altitude_m: Option<f64>,

    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default)]
    pub is_mock: bool,

    pub recorded_at: DateTime<Utc>,
}

fn default_provider() -> String {
    DEFAULT_PROVIDER.to_string()
}

impl LocationSample {
    /// Builds the wire sample for a reading taken within `context`.
    pub fn from_reading(
        context: &AssignmentContext,
        provider: &str,
        reading: &PositionReading,
    ) -> Self {
        Self {
            company_id: context.company_id.clone(),
            assignment_id: context.assignment_id.clone(),
            lat: reading.lat,
            lng: reading.lng,
            accuracy_m: reading.accuracy_m,
            speed_mps: reading.speed_mps,
            heading_deg: reading.heading_deg,
            altitude_m: reading.altitude_m,
            provider: provider.to_string(),
            is_mock: reading.is_mock,
            recorded_at: reading.timestamp,
        }
    }
}
