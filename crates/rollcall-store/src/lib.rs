//! rollcall-store — SQLite persistence for the attendance service.
//!
//! Owns the student roster, the teacher list, and the attendance log, plus
//! the process-wide roster snapshot that recognition reads from. The snapshot
//! is rebuilt wholesale after every roster mutation and published by pointer
//! swap, so readers always observe a fully-built set.

pub mod db;
pub mod roster;

pub use db::{
    AttendanceMethod, AttendanceRecord, AttendanceStatus, NewStudent, RollcallDb, StoreError,
    StudentRecord,
};
pub use roster::{Roster, RosterSnapshot};
