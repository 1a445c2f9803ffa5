//! Shared domain enumerations aligned with persisted database enums.

use serde::{Deserialize, Serialize};

/// Lifecycle of one queued distribution request.
///
/// `Completed` and `Failed` are terminal: the processor never re-claims a
/// record once it reaches either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "dispatch_status", rename_all = "snake_case")]
pub enum DispatchStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DispatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DispatchStatus::Pending => "pending",
            DispatchStatus::Processing => "processing",
            DispatchStatus::Completed => "completed",
            DispatchStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DispatchStatus::Completed | DispatchStatus::Failed)
    }
}

impl TryFrom<&str> for DispatchStatus {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(DispatchStatus::Pending),
            "processing" => Ok(DispatchStatus::Processing),
            "completed" => Ok(DispatchStatus::Completed),
            "failed" => Ok(DispatchStatus::Failed),
            _ => Err(()),
        }
    }
}

/// Queue ordering weight. Higher priorities are claimed first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "dispatch_priority", rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
        }
    }

    /// Numeric weight used for claim ordering (high first).
    pub fn weight(self) -> i16 {
        match self {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
        }
    }
}

impl TryFrom<&str> for Priority {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            _ => Err(()),
        }
    }
}

/// Lifecycle of a scheduled broadcast job.
///
/// `queued -> running -> {success | queued (rescheduled) | failed}`; a job
/// never leaves `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Success,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
        }
    }
}

impl TryFrom<&str> for JobStatus {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "success" => Ok(JobStatus::Success),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(()),
        }
    }
}

/// External destinations the engine can deliver to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Hashnode,
    Devto,
    Twitter,
    Linkedin,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Hashnode => "hashnode",
            Channel::Devto => "devto",
            Channel::Twitter => "twitter",
            Channel::Linkedin => "linkedin",
        }
    }

    pub const ALL: [Channel; 4] = [
        Channel::Hashnode,
        Channel::Devto,
        Channel::Twitter,
        Channel::Linkedin,
    ];
}

impl TryFrom<&str> for Channel {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "hashnode" => Ok(Channel::Hashnode),
            "devto" | "dev.to" => Ok(Channel::Devto),
            "twitter" | "x" => Ok(Channel::Twitter),
            "linkedin" => Ok(Channel::Linkedin),
            _ => Err(()),
        }
    }
}

/// Kind tags for the append-only activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityKind {
    PostPublished,
    PostUpdated,
    PostDeleted,
    BroadcastSent,
}

impl ActivityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityKind::PostPublished => "POST_PUBLISHED",
            ActivityKind::PostUpdated => "POST_UPDATED",
            ActivityKind::PostDeleted => "POST_DELETED",
            ActivityKind::BroadcastSent => "BROADCAST_SENT",
        }
    }
}

impl TryFrom<&str> for ActivityKind {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "POST_PUBLISHED" => Ok(ActivityKind::PostPublished),
            "POST_UPDATED" => Ok(ActivityKind::PostUpdated),
            "POST_DELETED" => Ok(ActivityKind::PostDeleted),
            "BROADCAST_SENT" => Ok(ActivityKind::BroadcastSent),
            _ => Err(()),
        }
    }
}
