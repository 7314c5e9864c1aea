//! Presence capture, confirmation and ETA wire models.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Direction of a presence capture: booking on at shift start or off at shift end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    On,
    Off,
}

impl Direction {
    /// Path segment of the presence endpoint for this direction.
    pub fn endpoint_segment(&self) -> &'static str {
        match self {
            Direction::On => "book-on",
            Direction::Off => "book-off",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::On => write!(f, "on"),
            Direction::Off => write!(f, "off"),
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "on" | "book-on" => Ok(Direction::On),
            "off" | "book-off" => Ok(Direction::Off),
            other => Err(format!("direction must be 'on' or 'off', got '{}'", other)),
        }
    }
}

/// Which reminder a shift confirmation answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationType {
    #[serde(rename = "shift_created")]
    ShiftCreated,
    #[serde(rename = "24h")]
    DayBefore,
    #[serde(rename = "2h")]
    TwoHoursBefore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationResponse {
    Accept,
    Decline,
}

/// Body of `POST /presence/confirmations`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Confirmation {
    #[validate(custom(function = "shared::validation::validate_identifier"))]
    pub assignment_id: String,

    #[serde(rename = "type")]
    pub confirmation_type: ConfirmationType,

    pub response: ConfirmationResponse,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 1000, message = "Notes must be at most 1000 characters"))]
    pub notes: Option<String>,
}

/// Body of `PUT /presence/eta/{assignmentId}`. `None` clears the ETA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct EtaUpdate {
    #[validate(custom(function = "shared::validation::validate_eta_minutes"))]
    pub eta: Option<u32>,
}

/// Response envelope returned by every presence endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub ok: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl<T> ApiEnvelope<T> {
    /// Server-supplied failure text, preferring `error` over `message`.
    pub fn failure_message(&self) -> Option<&str> {
        self.error.as_deref().or(self.message.as_deref())
    }
}
