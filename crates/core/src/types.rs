/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Owner of a letter job. Assigned upstream, one active job per user.
pub type UserId = uuid::Uuid;

/// Stable identifier of a letter job, minted on first persist.
pub type JobId = uuid::Uuid;
