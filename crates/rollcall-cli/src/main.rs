use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rollcall_store::{AttendanceMethod, AttendanceStatus, RollcallDb};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance roster administration")]
struct Cli {
    /// Path to the SQLite database (falls back to ROLLCALL_DB_PATH).
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema if it does not exist
    Init,
    /// List enrolled students
    Roster,
    /// Show recent attendance records
    Attendance {
        /// Maximum number of records to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Record manual attendance for a student
    Mark {
        /// Student serial number
        serial: String,
        /// present, absent, or late
        #[arg(short, long, default_value = "present")]
        status: String,
        /// Free-form note attached to the record
        #[arg(short, long)]
        notes: Option<String>,
        /// Teacher username to attribute the record to
        #[arg(short, long)]
        teacher: Option<String>,
    },
    /// Remove a student and their attendance history
    Remove {
        /// Student serial number
        serial: String,
    },
    /// Add a teacher for manual-attendance attribution
    AddTeacher {
        username: String,
        email: String,
        /// Login password for the web layer
        #[arg(short, long)]
        password: String,
    },
}

fn db_path(cli: &Cli) -> PathBuf {
    cli.db.clone().unwrap_or_else(|| {
        std::env::var("ROLLCALL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("attendance.db"))
    })
}

fn parse_status(s: &str) -> Result<AttendanceStatus> {
    match AttendanceStatus::parse(s) {
        Some(status) => Ok(status),
        None => bail!("unknown status {s:?}; expected present, absent, or late"),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let path = db_path(&cli);
    let db = RollcallDb::open(&path)
        .with_context(|| format!("opening database at {}", path.display()))?;

    match cli.command {
        Commands::Init => {
            // Schema creation happens on open.
            println!("database ready at {}", path.display());
        }
        Commands::Roster => {
            let students = db.list_students()?;
            if students.is_empty() {
                println!("No students enrolled");
            }
            for s in students {
                let face = if s.has_face { "face enrolled" } else { "no face" };
                println!("#{}  {}  <{}>  {}  [{}]", s.serial, s.name, s.email, s.phone, face);
            }
        }
        Commands::Attendance { limit } => {
            let records = db.recent_attendance(limit)?;
            if records.is_empty() {
                println!("No attendance records");
            }
            for r in records {
                let notes = r.notes.as_deref().unwrap_or("");
                println!(
                    "{}  #{} {}  {} ({})  {}",
                    r.timestamp, r.serial, r.name, r.status, r.method, notes
                );
            }
        }
        Commands::Mark {
            serial,
            status,
            notes,
            teacher,
        } => {
            let status = parse_status(&status)?;
            let teacher_id = match teacher {
                Some(name) => Some(
                    db.teacher_id(&name)?
                        .with_context(|| format!("no teacher named {name:?}"))?,
                ),
                None => None,
            };
            db.mark_attendance(
                &serial,
                status,
                AttendanceMethod::Manual,
                teacher_id,
                notes.as_deref(),
            )?;
            println!("Marked {} for student #{serial}", status.as_str());
        }
        Commands::Remove { serial } => {
            db.remove_student(&serial)?;
            println!("Removed student #{serial}");
        }
        Commands::AddTeacher {
            username,
            email,
            password,
        } => {
            let id = db.add_teacher(&username, &email, &password)?;
            println!("Added teacher {username} (id {id})");
        }
    }

    Ok(())
}
