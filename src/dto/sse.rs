use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dto::session::SessionView;

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    /// SSE event name.
    pub event: Option<String>,
    /// JSON encoded data field.
    pub data: String,
    /// Session the event is about, used to filter per-session streams.
    pub session_id: Option<Uuid>,
}

impl ServerEvent {
    /// Build an event with a raw data payload.
    pub fn new(event: Option<String>, data: String) -> Self {
        Self {
            event,
            data,
            session_id: None,
        }
    }

    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self::new(event.into(), serde_json::to_string(payload)?))
    }

    /// Tag the event with the session it concerns.
    pub fn for_session(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Whether a subscriber of `session_id` should receive the event.
    pub fn concerns(&self, session_id: Uuid) -> bool {
        self.session_id.is_none_or(|id| id == session_id)
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Identifier of the SSE stream (`public` or `session`).
    pub stream: String,
    /// Session followed by the stream, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    /// New degraded flag.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
/// Broadcast after every committed session change.
pub struct SessionUpdatedEvent(pub SessionView);

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast after a committed answer.
pub struct AnswerEvent {
    /// Session answered in.
    pub session_id: Uuid,
    /// Player who answered.
    pub player_id: String,
    /// Grading result.
    pub correct: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_events_reach_every_session_stream() {
        let event = ServerEvent::new(Some("system_status".into()), "{}".into());
        assert!(event.concerns(Uuid::new_v4()));

        let id = Uuid::new_v4();
        let tagged = event.for_session(id);
        assert!(tagged.concerns(id));
        assert!(!tagged.concerns(Uuid::new_v4()));
    }
}
