use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Health endpoint payloads.
pub mod health;
/// Match history and player statistics payloads.
pub mod history;
/// Session requests and views.
pub mod session;
/// Server-sent event payloads.
pub mod sse;
/// Field validators shared by request payloads.
pub mod validation;

pub(crate) fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
