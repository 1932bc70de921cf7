/// Event identifiers are UUIDv7, so identifier order follows creation time.
pub type EventId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
