/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Identifier of one invocation; also the name of its working directory.
pub type JobId = uuid::Uuid;

/// Caller-chosen identifier pairing an invocation with a websocket.
pub type SessionId = uuid::Uuid;
