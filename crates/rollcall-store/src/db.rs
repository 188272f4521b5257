//! SQLite-backed roster and attendance storage.

use chrono::Utc;
use rollcall_core::encoding;
use rollcall_core::Embedding;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("embedding codec: {0}")]
    Encoding(#[from] rollcall_core::encoding::EncodingError),
    #[error("no student with serial number {0}")]
    UnknownSerial(String),
    #[error("no attendance record with id {0}")]
    UnknownAttendanceId(i64),
    #[error("serial number must be 1-10 alphanumeric characters, got {0:?}")]
    InvalidSerial(String),
    #[error("phone number must be exactly 10 digits, got {0:?}")]
    InvalidPhone(String),
    #[error("a student with the same serial number, username, or email already exists")]
    AlreadyEnrolled,
}

/// A registration candidate. The embedding is optional: a student may enroll
/// without a captured face and register one later.
#[derive(Debug, Clone)]
pub struct NewStudent {
    pub serial: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub embedding: Option<Embedding>,
}

/// A stored student row, embedding elided.
#[derive(Debug, Clone)]
pub struct StudentRecord {
    pub id: i64,
    pub serial: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub has_face: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "Present",
            Self::Absent => "Absent",
            Self::Late => "Late",
        }
    }

    /// Case-insensitive, so it accepts both stored values and CLI input.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "present" => Some(Self::Present),
            "absent" => Some(Self::Absent),
            "late" => Some(Self::Late),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceMethod {
    FaceRecognition,
    Manual,
}

impl AttendanceMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FaceRecognition => "Face Recognition",
            Self::Manual => "Manual",
        }
    }
}

/// One attendance row joined with its student.
#[derive(Debug, Clone)]
pub struct AttendanceRecord {
    pub id: i64,
    pub serial: String,
    pub name: String,
    pub timestamp: String,
    pub status: String,
    pub method: String,
    pub notes: Option<String>,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS teachers (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    username    TEXT NOT NULL UNIQUE,
    email       TEXT NOT NULL UNIQUE,
    password    TEXT NOT NULL,
    created_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS students (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    serial_number TEXT NOT NULL UNIQUE,
    username      TEXT NOT NULL UNIQUE,
    email         TEXT NOT NULL UNIQUE,
    phone         TEXT NOT NULL,
    face_encoding TEXT,
    created_at    TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS attendance (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    student_id  INTEGER NOT NULL REFERENCES students(id) ON DELETE CASCADE,
    timestamp   TEXT NOT NULL,
    status      TEXT NOT NULL DEFAULT 'Present',
    method      TEXT NOT NULL DEFAULT 'Face Recognition',
    teacher_id  INTEGER REFERENCES teachers(id) ON DELETE SET NULL,
    notes       TEXT
);
";

/// Handle over the SQLite database. One connection, used synchronously from
/// the engine thread or the CLI.
pub struct RollcallDb {
    conn: Connection,
}

impl RollcallDb {
    /// Open (or create) the database at `path` and ensure the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    // --- students ---

    /// Insert a student row. Does NOT run the duplicate-face check; that is
    /// the registration flow's job, strictly before calling this.
    pub fn add_student(&self, student: &NewStudent) -> Result<i64, StoreError> {
        validate_serial(&student.serial)?;
        validate_phone(&student.phone)?;

        let encoding_text = match &student.embedding {
            Some(e) => Some(encoding::encode(e)?),
            None => None,
        };

        self.conn
            .execute(
                "INSERT INTO students (serial_number, username, email, phone, face_encoding)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    student.serial,
                    student.name,
                    student.email,
                    student.phone,
                    encoding_text
                ],
            )
            .map_err(map_constraint)?;

        Ok(self.conn.last_insert_rowid())
    }

    pub fn update_student(
        &self,
        serial: &str,
        name: &str,
        email: &str,
        phone: &str,
    ) -> Result<(), StoreError> {
        validate_phone(phone)?;
        let changed = self
            .conn
            .execute(
                "UPDATE students SET username = ?1, email = ?2, phone = ?3
                 WHERE serial_number = ?4",
                params![name, email, phone, serial],
            )
            .map_err(map_constraint)?;
        if changed == 0 {
            return Err(StoreError::UnknownSerial(serial.to_string()));
        }
        Ok(())
    }

    /// Replace the stored embedding for a student (face re-registration).
    pub fn set_face(&self, serial: &str, embedding: &Embedding) -> Result<(), StoreError> {
        let text = encoding::encode(embedding)?;
        let changed = self.conn.execute(
            "UPDATE students SET face_encoding = ?1 WHERE serial_number = ?2",
            params![text, serial],
        )?;
        if changed == 0 {
            return Err(StoreError::UnknownSerial(serial.to_string()));
        }
        Ok(())
    }

    /// Delete a student; attendance rows follow via ON DELETE CASCADE.
    pub fn remove_student(&self, serial: &str) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "DELETE FROM students WHERE serial_number = ?1",
            params![serial],
        )?;
        if changed == 0 {
            return Err(StoreError::UnknownSerial(serial.to_string()));
        }
        Ok(())
    }

    pub fn student_by_serial(&self, serial: &str) -> Result<Option<StudentRecord>, StoreError> {
        let record = self
            .conn
            .query_row(
                "SELECT id, serial_number, username, email, phone,
                        face_encoding IS NOT NULL, created_at
                 FROM students WHERE serial_number = ?1",
                params![serial],
                row_to_student,
            )
            .optional()?;
        Ok(record)
    }

    pub fn list_students(&self) -> Result<Vec<StudentRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, serial_number, username, email, phone,
                    face_encoding IS NOT NULL, created_at
             FROM students ORDER BY serial_number",
        )?;
        let rows = stmt.query_map([], row_to_student)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Read every stored (serial, name, encoding-text) triple, in serial
    /// order. Raw rows; parsing and skip policy live in the roster reload.
    pub fn face_rows(&self) -> Result<Vec<(String, String, String)>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT serial_number, username, face_encoding
             FROM students WHERE face_encoding IS NOT NULL
             ORDER BY serial_number",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    // --- teachers ---

    pub fn add_teacher(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<i64, StoreError> {
        self.conn
            .execute(
                "INSERT INTO teachers (username, email, password) VALUES (?1, ?2, ?3)",
                params![username, email, password],
            )
            .map_err(map_constraint)?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Check teacher credentials. Returns the teacher id on a match, `None`
    /// for an unknown username or wrong password.
    pub fn verify_teacher(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<i64>, StoreError> {
        let row: Option<(i64, String)> = self
            .conn
            .query_row(
                "SELECT id, password FROM teachers WHERE username = ?1",
                params![username],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row.and_then(|(id, stored)| (stored == password).then_some(id)))
    }

    pub fn teacher_id(&self, username: &str) -> Result<Option<i64>, StoreError> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM teachers WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    // --- attendance ---

    /// Record attendance for a student, timestamped now.
    pub fn mark_attendance(
        &self,
        serial: &str,
        status: AttendanceStatus,
        method: AttendanceMethod,
        teacher_id: Option<i64>,
        notes: Option<&str>,
    ) -> Result<i64, StoreError> {
        let student_id: i64 = self
            .conn
            .query_row(
                "SELECT id FROM students WHERE serial_number = ?1",
                params![serial],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StoreError::UnknownSerial(serial.to_string()))?;

        // UTC keeps the TEXT column lexicographically sortable; local offsets
        // would break the ORDER BY across a DST transition.
        let timestamp = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO attendance (student_id, timestamp, status, method, teacher_id, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                student_id,
                timestamp,
                status.as_str(),
                method.as_str(),
                teacher_id,
                notes
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::info!(serial, status = status.as_str(), method = method.as_str(), "attendance marked");
        Ok(id)
    }

    pub fn recent_attendance(&self, limit: usize) -> Result<Vec<AttendanceRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT a.id, s.serial_number, s.username, a.timestamp, a.status, a.method, a.notes
             FROM attendance a JOIN students s ON a.student_id = s.id
             ORDER BY a.timestamp DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(AttendanceRecord {
                id: row.get(0)?,
                serial: row.get(1)?,
                name: row.get(2)?,
                timestamp: row.get(3)?,
                status: row.get(4)?,
                method: row.get(5)?,
                notes: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn update_attendance(
        &self,
        id: i64,
        status: AttendanceStatus,
        notes: Option<&str>,
        teacher_id: Option<i64>,
    ) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE attendance SET status = ?1, notes = ?2, teacher_id = ?3 WHERE id = ?4",
            params![status.as_str(), notes, teacher_id, id],
        )?;
        if changed == 0 {
            return Err(StoreError::UnknownAttendanceId(id));
        }
        Ok(())
    }

    pub fn delete_attendance(&self, id: i64) -> Result<(), StoreError> {
        let changed = self
            .conn
            .execute("DELETE FROM attendance WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(StoreError::UnknownAttendanceId(id));
        }
        Ok(())
    }

    /// Raw connection, for tests that need to corrupt rows behind the codec.
    #[cfg(test)]
    pub(crate) fn raw(&self) -> &Connection {
        &self.conn
    }
}

fn row_to_student(row: &rusqlite::Row<'_>) -> Result<StudentRecord, rusqlite::Error> {
    Ok(StudentRecord {
        id: row.get(0)?,
        serial: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        phone: row.get(4)?,
        has_face: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn map_constraint(err: rusqlite::Error) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::AlreadyEnrolled
        }
        _ => StoreError::Sqlite(err),
    }
}

fn validate_serial(serial: &str) -> Result<(), StoreError> {
    let ok = !serial.is_empty()
        && serial.len() <= 10
        && serial.chars().all(|c| c.is_ascii_alphanumeric());
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidSerial(serial.to_string()))
    }
}

fn validate_phone(phone: &str) -> Result<(), StoreError> {
    let ok = phone.len() == 10 && phone.chars().all(|c| c.is_ascii_digit());
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidPhone(phone.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(serial: &str, name: &str, embedding: Option<Embedding>) -> NewStudent {
        NewStudent {
            serial: serial.to_string(),
            name: name.to_string(),
            email: format!("{name}@example.edu"),
            phone: "5550001234".to_string(),
            embedding,
        }
    }

    #[test]
    fn test_add_and_fetch_student() {
        let db = RollcallDb::open_in_memory().unwrap();
        let id = db
            .add_student(&student("01", "Alice", Some(Embedding::new(vec![1.0, 2.0]))))
            .unwrap();
        assert!(id > 0);

        let rec = db.student_by_serial("01").unwrap().unwrap();
        assert_eq!(rec.name, "Alice");
        assert!(rec.has_face);
        assert!(db.student_by_serial("99").unwrap().is_none());
    }

    #[test]
    fn test_faceless_registration_allowed() {
        let db = RollcallDb::open_in_memory().unwrap();
        db.add_student(&student("02", "Bob", None)).unwrap();
        let rec = db.student_by_serial("02").unwrap().unwrap();
        assert!(!rec.has_face);
        assert!(db.face_rows().unwrap().is_empty());
    }

    #[test]
    fn test_serial_and_phone_validation() {
        let db = RollcallDb::open_in_memory().unwrap();

        let mut bad = student("has space", "X", None);
        assert!(matches!(
            db.add_student(&bad),
            Err(StoreError::InvalidSerial(_))
        ));

        bad = student("03", "Y", None);
        bad.phone = "123".into();
        assert!(matches!(
            db.add_student(&bad),
            Err(StoreError::InvalidPhone(_))
        ));
    }

    #[test]
    fn test_duplicate_serial_maps_to_already_enrolled() {
        let db = RollcallDb::open_in_memory().unwrap();
        db.add_student(&student("04", "Dana", None)).unwrap();
        let clash = student("04", "Other", None);
        assert!(matches!(
            db.add_student(&clash),
            Err(StoreError::AlreadyEnrolled)
        ));
    }

    #[test]
    fn test_set_face_replaces_encoding() {
        let db = RollcallDb::open_in_memory().unwrap();
        db.add_student(&student("05", "Eve", None)).unwrap();
        db.set_face("05", &Embedding::new(vec![0.5, 0.5])).unwrap();

        let rows = db.face_rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, "05");

        assert!(matches!(
            db.set_face("nope", &Embedding::new(vec![1.0])),
            Err(StoreError::UnknownSerial(_))
        ));
    }

    #[test]
    fn test_mark_attendance_and_cascade_delete() {
        let db = RollcallDb::open_in_memory().unwrap();
        db.add_student(&student("06", "Finn", None)).unwrap();
        db.mark_attendance(
            "06",
            AttendanceStatus::Present,
            AttendanceMethod::FaceRecognition,
            None,
            None,
        )
        .unwrap();

        let recent = db.recent_attendance(10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].serial, "06");
        assert_eq!(recent[0].method, "Face Recognition");

        db.remove_student("06").unwrap();
        assert!(db.recent_attendance(10).unwrap().is_empty());
    }

    #[test]
    fn test_mark_attendance_unknown_serial() {
        let db = RollcallDb::open_in_memory().unwrap();
        assert!(matches!(
            db.mark_attendance(
                "77",
                AttendanceStatus::Present,
                AttendanceMethod::Manual,
                None,
                None
            ),
            Err(StoreError::UnknownSerial(_))
        ));
    }

    #[test]
    fn test_manual_attendance_with_teacher_attribution() {
        let db = RollcallDb::open_in_memory().unwrap();
        db.add_student(&student("07", "Gus", None)).unwrap();
        let tid = db
            .add_teacher("mr_kim", "kim@example.edu", "chalkdust")
            .unwrap();

        db.mark_attendance(
            "07",
            AttendanceStatus::Late,
            AttendanceMethod::Manual,
            Some(tid),
            Some("arrived 10:20"),
        )
        .unwrap();

        let recent = db.recent_attendance(1).unwrap();
        assert_eq!(recent[0].status, "Late");
        assert_eq!(recent[0].notes.as_deref(), Some("arrived 10:20"));
        assert_eq!(db.teacher_id("mr_kim").unwrap(), Some(tid));
    }

    #[test]
    fn test_verify_teacher_credentials() {
        let db = RollcallDb::open_in_memory().unwrap();
        let tid = db
            .add_teacher("ms_ada", "ada@example.edu", "lovelace")
            .unwrap();

        assert_eq!(db.verify_teacher("ms_ada", "lovelace").unwrap(), Some(tid));
        assert_eq!(db.verify_teacher("ms_ada", "wrong").unwrap(), None);
        assert_eq!(db.verify_teacher("nobody", "lovelace").unwrap(), None);
    }

    #[test]
    fn test_attendance_mutations_reject_unknown_id() {
        let db = RollcallDb::open_in_memory().unwrap();
        assert!(matches!(
            db.update_attendance(999, AttendanceStatus::Absent, None, None),
            Err(StoreError::UnknownAttendanceId(999))
        ));
        assert!(matches!(
            db.delete_attendance(999),
            Err(StoreError::UnknownAttendanceId(999))
        ));
    }

    #[test]
    fn test_attendance_timestamps_are_utc_and_sortable() {
        let db = RollcallDb::open_in_memory().unwrap();
        db.add_student(&student("09", "Iris", None)).unwrap();
        db.mark_attendance(
            "09",
            AttendanceStatus::Present,
            AttendanceMethod::Manual,
            None,
            None,
        )
        .unwrap();
        db.mark_attendance(
            "09",
            AttendanceStatus::Late,
            AttendanceMethod::Manual,
            None,
            None,
        )
        .unwrap();

        let recent = db.recent_attendance(10).unwrap();
        assert_eq!(recent.len(), 2);
        for r in &recent {
            // Fixed-offset UTC form: lexicographic order equals time order.
            assert!(r.timestamp.ends_with("+00:00"), "not UTC: {}", r.timestamp);
        }
        assert!(recent[0].timestamp >= recent[1].timestamp);
    }

    #[test]
    fn test_edit_and_delete_attendance() {
        let db = RollcallDb::open_in_memory().unwrap();
        db.add_student(&student("08", "Hana", None)).unwrap();
        let id = db
            .mark_attendance(
                "08",
                AttendanceStatus::Present,
                AttendanceMethod::Manual,
                None,
                None,
            )
            .unwrap();

        db.update_attendance(id, AttendanceStatus::Absent, Some("corrected"), None)
            .unwrap();
        let recent = db.recent_attendance(1).unwrap();
        assert_eq!(recent[0].status, "Absent");

        db.delete_attendance(id).unwrap();
        assert!(db.recent_attendance(10).unwrap().is_empty());
    }
}
