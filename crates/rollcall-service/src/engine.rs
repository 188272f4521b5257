//! The attendance engine: a dedicated thread owning the analyzer and the
//! database connection, fed through an mpsc channel with oneshot replies.
//!
//! Single-writer by construction — every roster mutation and every snapshot
//! rebuild happens on this thread, so matching reads elsewhere can never see
//! a half-rebuilt set.

use crate::analyzer::{AnalyzerError, FaceAnalyzer};
use crate::config::Thresholds;
use rollcall_core::{matcher, ClosestMiss, DuplicateHit, Recognition};
use rollcall_store::{
    AttendanceMethod, AttendanceStatus, NewStudent, RollcallDb, Roster, StoreError,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("analyzer error: {0}")]
    Analyzer(#[from] AnalyzerError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("no face detected in the submitted image")]
    NoFaceDetected,
    #[error("{count} faces detected; attendance capture requires exactly one subject in frame")]
    MultipleFacesDetected { count: usize },
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Registration form fields, minus the face image.
#[derive(Debug, Clone, Serialize)]
pub struct StudentForm {
    pub serial: String,
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// Result of a recognition attempt. All variants are ordinary outcomes;
/// the error cases (no face, several faces) never reach the matcher.
#[derive(Debug, Clone, Serialize)]
pub enum RecognizeOutcome {
    /// Nothing enrolled yet — nothing to compare against.
    NoneEnrolled,
    /// Positive identification; attendance has already been written.
    Recognized {
        serial: String,
        label: String,
        distance: f32,
        attendance_id: i64,
    },
    /// A face was compared but nothing cleared the threshold.
    Unrecognized { closest: Option<ClosestMiss> },
}

/// Result of a registration attempt.
#[derive(Debug, Clone, Serialize)]
pub enum RegisterOutcome {
    Enrolled {
        student_id: i64,
        /// False when the enrollment image yielded no face; the student can
        /// register a face later.
        face_enrolled: bool,
    },
    /// The candidate's face collides with an enrolled identity under the
    /// strict threshold; nothing was written.
    Refused { conflict: DuplicateHit },
}

enum EngineRequest {
    Recognize {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<RecognizeOutcome, EngineError>>,
    },
    Register {
        form: StudentForm,
        image: Option<Vec<u8>>,
        reply: oneshot::Sender<Result<RegisterOutcome, EngineError>>,
    },
    Update {
        form: StudentForm,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Remove {
        serial: String,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Reload {
        reply: oneshot::Sender<Result<usize, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    roster: Arc<Roster>,
}

impl EngineHandle {
    /// Identify the subject in `image` and, on a positive match, record
    /// attendance.
    pub async fn recognize(&self, image: Vec<u8>) -> Result<RecognizeOutcome, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Recognize {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Register a new student, running the duplicate-face check strictly
    /// before the insert.
    pub async fn register(
        &self,
        form: StudentForm,
        image: Option<Vec<u8>>,
    ) -> Result<RegisterOutcome, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Register {
                form,
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Edit a student's contact fields; the roster label follows the name.
    pub async fn update(&self, form: StudentForm) -> Result<(), EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Update {
                form,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Delete a student and their attendance history.
    pub async fn remove(&self, serial: String) -> Result<(), EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Remove {
                serial,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Force a full snapshot rebuild; returns the enrolled-face count.
    pub async fn reload(&self) -> Result<usize, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Reload { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// The shared roster cache, for read-only collaborators.
    pub fn roster(&self) -> Arc<Roster> {
        Arc::clone(&self.roster)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Builds the initial roster snapshot up front (fail-fast if the database is
/// unreadable), then enters the request loop.
pub fn spawn_engine<A>(
    analyzer: A,
    db: RollcallDb,
    thresholds: Thresholds,
) -> Result<EngineHandle, EngineError>
where
    A: FaceAnalyzer + 'static,
{
    let roster = Arc::new(Roster::empty());
    let enrolled = roster.reload(&db)?;
    tracing::info!(
        enrolled,
        recognition = thresholds.recognition,
        duplicate = thresholds.duplicate,
        "engine starting"
    );

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);
    let thread_roster = Arc::clone(&roster);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            let mut analyzer = analyzer;
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Recognize { image, reply } => {
                        let result = run_recognize(
                            &mut analyzer,
                            &db,
                            &thread_roster,
                            thresholds.recognition,
                            &image,
                        );
                        let _ = reply.send(result);
                    }
                    EngineRequest::Register { form, image, reply } => {
                        let result = run_register(
                            &mut analyzer,
                            &db,
                            &thread_roster,
                            thresholds.duplicate,
                            form,
                            image.as_deref(),
                        );
                        let _ = reply.send(result);
                    }
                    EngineRequest::Update { form, reply } => {
                        let result = db
                            .update_student(&form.serial, &form.name, &form.email, &form.phone)
                            .map_err(EngineError::from)
                            .and_then(|()| {
                                thread_roster.reload(&db)?;
                                Ok(())
                            });
                        let _ = reply.send(result);
                    }
                    EngineRequest::Remove { serial, reply } => {
                        let result = db
                            .remove_student(&serial)
                            .map_err(EngineError::from)
                            .and_then(|()| {
                                thread_roster.reload(&db)?;
                                Ok(())
                            });
                        let _ = reply.send(result);
                    }
                    EngineRequest::Reload { reply } => {
                        let result = thread_roster.reload(&db).map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    Ok(EngineHandle { tx, roster })
}

fn run_recognize<A: FaceAnalyzer>(
    analyzer: &mut A,
    db: &RollcallDb,
    roster: &Roster,
    threshold: f32,
    image: &[u8],
) -> Result<RecognizeOutcome, EngineError> {
    let scan = analyzer.scan(image)?;
    match scan.face_count() {
        0 => return Err(EngineError::NoFaceDetected),
        1 => {}
        count => return Err(EngineError::MultipleFacesDetected { count }),
    }
    let probe = &scan.embeddings[0];

    let snapshot = roster.snapshot();
    match matcher::recognize(&snapshot.entries, probe, threshold) {
        Recognition::EmptyRoster => {
            tracing::info!("recognition requested with no identities enrolled");
            Ok(RecognizeOutcome::NoneEnrolled)
        }
        Recognition::Match {
            serial,
            label,
            distance,
        } => {
            let attendance_id = db.mark_attendance(
                &serial,
                AttendanceStatus::Present,
                AttendanceMethod::FaceRecognition,
                None,
                None,
            )?;
            tracing::info!(label = %label, distance, "face recognized");
            Ok(RecognizeOutcome::Recognized {
                serial,
                label,
                distance,
                attendance_id,
            })
        }
        Recognition::NoMatch { closest } => {
            if let Some(miss) = &closest {
                tracing::info!(
                    closest = %miss.label,
                    distance = miss.distance,
                    threshold,
                    "face not recognized"
                );
            }
            Ok(RecognizeOutcome::Unrecognized { closest })
        }
    }
}

fn run_register<A: FaceAnalyzer>(
    analyzer: &mut A,
    db: &RollcallDb,
    roster: &Roster,
    duplicate_threshold: f32,
    form: StudentForm,
    image: Option<&[u8]>,
) -> Result<RegisterOutcome, EngineError> {
    let mut embedding = None;
    if let Some(image) = image {
        let scan = analyzer.scan(image)?;
        match scan.embeddings.into_iter().next() {
            Some(e) => embedding = Some(e),
            None => {
                tracing::warn!(
                    serial = %form.serial,
                    "no face found in enrollment image; registering without one"
                );
            }
        }
    }

    // Duplicate check runs against the roster as it stands, which by
    // construction does not yet contain the candidate, and strictly before
    // the insert.
    if let Some(candidate) = &embedding {
        let snapshot = roster.snapshot();
        if let Some(conflict) =
            matcher::find_duplicate(&snapshot.entries, candidate, duplicate_threshold)
        {
            tracing::info!(
                conflict = %conflict.label,
                distance = conflict.distance,
                "registration refused: face already enrolled"
            );
            return Ok(RegisterOutcome::Refused { conflict });
        }
    }

    let face_enrolled = embedding.is_some();
    let student_id = db.add_student(&NewStudent {
        serial: form.serial.clone(),
        name: form.name,
        email: form.email,
        phone: form.phone,
        embedding,
    })?;
    roster.reload(db)?;
    tracing::info!(serial = %form.serial, face_enrolled, "student registered");

    Ok(RegisterOutcome::Enrolled {
        student_id,
        face_enrolled,
    })
}
