pub mod accounts;
pub mod host;
pub mod log;
pub mod matcher;
pub mod pipeline;
pub mod playlist;
pub mod recurrence;
pub mod rename;
pub mod schedule;

// Re-export the types most callers start from.
pub use accounts::AliasTable;
pub use log::{Level, RunLog};
pub use matcher::{MatchFailure, RecordingCandidate};
pub use schedule::{EntryId, ScheduleEntry, ScheduleIndex, ScheduleRow};
