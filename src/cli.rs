//! CLI interface for attendify

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::analytics;
use crate::checkin::{self, CheckInRequest, CheckInService};
use crate::config::{self, Config};
use crate::server::auth::{self, AuthSettings, AuthState};
use crate::server::http::{build_course, enroll_student, NewCourse, NewStudent};
use crate::server::{self, AppState, TlsFiles};
use crate::store::Database;
use crate::verify::{FaceVerifier, GeminiVerifier, StaticVerifier};

#[derive(Parser)]
#[command(name = "attendify")]
#[command(about = "Course attendance with schedule-aware check-in and face verification", long_about = None)]
#[command(version)]
struct Cli {
    /// Use this config file instead of the platform default
    #[arg(long, global = true, env = "ATTENDIFY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web server
    Serve {
        /// Port to listen on (defaults to the configured port)
        #[arg(short, long)]
        port: Option<u16>,
        /// Host to bind to (defaults to the configured host)
        #[arg(long)]
        host: Option<String>,
        /// Enable HTTPS
        #[arg(long, requires_all = ["cert", "key"])]
        https: bool,
        /// Path to TLS certificate (PEM)
        #[arg(long)]
        cert: Option<PathBuf>,
        /// Path to TLS private key (PEM)
        #[arg(long)]
        key: Option<PathBuf>,
        /// Keep all data in memory for this run
        #[arg(long)]
        ephemeral: bool,
    },
    /// Manage the student roster
    Student {
        #[command(subcommand)]
        command: StudentCommands,
    },
    /// Manage courses and their schedules
    Course {
        #[command(subcommand)]
        command: CourseCommands,
    },
    /// Check a student in from a photo file
    Checkin {
        /// Student record id
        #[arg(short, long)]
        student: String,
        /// Course id (nearest course today when omitted)
        #[arg(short, long)]
        course: Option<String>,
        /// Captured photo
        #[arg(long)]
        photo: PathBuf,
        /// Accept the capture without calling the verification API
        #[arg(long)]
        offline: bool,
    },
    /// Show a student's attendance history
    History {
        /// Student record id
        #[arg(short, long)]
        student: String,
    },
    /// Print the lecturer dashboard
    Dashboard,
    /// Record every student without a check-in as absent
    Absentees {
        /// Course id
        #[arg(short, long)]
        course: String,
        /// Session date, YYYY-MM-DD (today when omitted)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Write the demo roster and schedule to the data directory
    Seed,
    /// Configure attendify
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
        /// Store the Gemini API key in the keyring
        #[arg(long)]
        set_api_key: Option<String>,
        /// Remove the stored Gemini API key
        #[arg(long)]
        delete_api_key: bool,
        /// Set the lecturer password
        #[arg(long)]
        set_password: bool,
    },
}

#[derive(Subcommand)]
enum StudentCommands {
    /// Enroll a student
    Add {
        #[arg(long)]
        name: String,
        /// Institutional student code, e.g. S104
        #[arg(long)]
        student_id: String,
        #[arg(long)]
        email: String,
        /// Reference photo
        #[arg(long)]
        photo: Option<PathBuf>,
    },
    /// List enrolled students
    List {
        /// Filter by name or student code
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Remove a student and their attendance records
    Remove {
        /// Student record id
        id: String,
    },
    /// Replace a student's reference photo
    Photo {
        /// Student record id
        id: String,
        #[arg(long)]
        photo: PathBuf,
    },
}

#[derive(Subcommand)]
enum CourseCommands {
    /// Create a course
    Add {
        #[arg(long)]
        code: String,
        #[arg(long)]
        name: String,
        /// Start time, HH:MM
        #[arg(long)]
        start: String,
        /// Comma-separated weekdays, e.g. Mon,Wed,Fri
        #[arg(long, value_delimiter = ',')]
        days: Vec<String>,
        /// Minutes before start that check-in opens
        #[arg(long)]
        early: Option<u32>,
        /// Minutes after start that still count as present
        #[arg(long)]
        late: Option<u32>,
    },
    /// List courses
    List,
    /// Remove a course and its attendance records
    Remove {
        /// Course id
        id: String,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => config::config_path()?,
    };
    let mut config = Config::load_from(&config_path)?;

    match cli.command {
        Commands::Serve { port, host, https, cert, key, ephemeral } => {
            if config.auth.jwt_secret.is_none() {
                config.auth.jwt_secret = Some(auth::generate_jwt_secret());
                config.save_to(&config_path)?;
            }
            let tls = match (https, cert, key) {
                (true, Some(cert), Some(key)) => Some(TlsFiles { cert, key }),
                (true, _, _) => bail!("--https requires --cert and --key"),
                _ => None,
            };
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);

            let db = Arc::new(open_database(&config, ephemeral)?);
            let verifier: Arc<dyn FaceVerifier> = Arc::new(GeminiVerifier::from_config(&config.verification)?);
            let state = AppState {
                checkin: Arc::new(checkin_service(&config, db.clone(), verifier)),
                auth: AuthState::new(AuthSettings::from_config(&config.auth)),
                db,
                config: Arc::new(config),
                clock: server::system_clock(),
            };
            server::start(state, &host, port, tls).await?;
        }
        Commands::Student { command } => {
            let db = open_database(&config, false)?;
            match command {
                StudentCommands::Add { name, student_id, email, photo } => {
                    let profile_image = photo.as_deref().map(encode_photo).transpose()?;
                    let student = enroll_student(&db, NewStudent { name, student_id, email, profile_image })?;
                    println!("Enrolled {} ({}) with id {}", student.name, student.student_id, student.id);
                }
                StudentCommands::List { search } => {
                    let students = db.search_students(search.as_deref().unwrap_or(""))?;
                    if students.is_empty() {
                        println!("No students found.");
                    }
                    for s in students {
                        println!("{:<10} {:<8} {:<24} {}", s.id, s.student_id, s.name, s.email);
                    }
                }
                StudentCommands::Remove { id } => {
                    if db.delete_student(&id)? {
                        println!("Removed student {}", id);
                    } else {
                        bail!("Unknown student: {}", id);
                    }
                }
                StudentCommands::Photo { id, photo } => {
                    let mut student = db
                        .get_student(&id)?
                        .with_context(|| format!("Unknown student: {}", id))?;
                    student.profile_image = Some(encode_photo(&photo)?);
                    db.save_student(student)?;
                    println!("Updated reference photo for {}", id);
                }
            }
        }
        Commands::Course { command } => {
            let db = open_database(&config, false)?;
            match command {
                CourseCommands::Add { code, name, start, days, early, late } => {
                    let form = NewCourse {
                        code,
                        name,
                        start_time: start,
                        days_of_week: days,
                        early_buffer: early,
                        late_buffer: late,
                    };
                    let course = build_course(form, auth::LECTURER_ID)?;
                    db.save_course(course.clone())?;
                    println!("Created {} with id {}", course.code, course.id);
                }
                CourseCommands::List => {
                    for c in db.get_courses()? {
                        println!(
                            "{:<8} {:<8} {:<28} {} {} (early {}m, late {}m)",
                            c.id,
                            c.code,
                            c.name,
                            c.start_time,
                            c.days_of_week.join("/"),
                            c.early_buffer,
                            c.late_buffer
                        );
                    }
                }
                CourseCommands::Remove { id } => {
                    if db.delete_course(&id)? {
                        println!("Removed course {}", id);
                    } else {
                        bail!("Unknown course: {}", id);
                    }
                }
            }
        }
        Commands::Checkin { student, course, photo, offline } => {
            let db = Arc::new(open_database(&config, false)?);
            let verifier: Arc<dyn FaceVerifier> = if offline {
                Arc::new(StaticVerifier::accepting(1.0))
            } else {
                Arc::new(GeminiVerifier::from_config(&config.verification)?)
            };
            let service = checkin_service(&config, db, verifier);
            let request = CheckInRequest {
                student_id: student,
                course_id: course,
                image: encode_photo(&photo)?,
            };
            let outcome = service.check_in(request, Local::now().fixed_offset()).await?;
            println!(
                "✓ {} at {} (confidence {:.0}%)",
                outcome.record.status,
                outcome.record.timestamp.format("%H:%M"),
                outcome.record.confidence_score * 100.0
            );
            println!("  {}", outcome.message);
        }
        Commands::History { student } => {
            let db = open_database(&config, false)?;
            let profile = db
                .get_student(&student)?
                .with_context(|| format!("Unknown student: {}", student))?;
            let courses = db.get_courses()?;
            let records = checkin::history(&db, &student)?;

            println!(
                "{} ({}): {} sessions",
                profile.name,
                profile.student_id,
                analytics::sessions_attended(&records)
            );
            for r in records {
                let code = courses
                    .iter()
                    .find(|c| c.id == r.course_id)
                    .map(|c| c.code.as_str())
                    .unwrap_or("?");
                println!("  {}  {:<8} {}", r.timestamp.format("%Y-%m-%d %H:%M"), code, r.status);
            }
        }
        Commands::Dashboard => {
            let db = open_database(&config, false)?;
            let board = analytics::dashboard(&db, &Local::now().fixed_offset(), config.schedule.risk_threshold)?;
            println!("Students enrolled:  {}", board.database_size);
            println!("Courses managed:    {}", board.managed_courses);
            println!("Check-ins today:    {}", board.todays_traffic);
            println!();
            println!("Engagement");
            for e in &board.course_engagement {
                println!("  {:<8} {}", e.code, e.count);
            }
            println!();
            println!("Risk watch (below {}%)", config.schedule.risk_threshold);
            if board.risk_watch.is_empty() {
                println!("  nobody");
            }
            for r in &board.risk_watch {
                println!("  {:<24} {:>5.1}%", r.student.name, r.rate);
            }
        }
        Commands::Absentees { course, date } => {
            let db = open_database(&config, false)?;
            let now = Local::now().fixed_offset();
            let date = date.unwrap_or_else(|| now.date_naive());
            let marked = analytics::mark_absentees(&db, &course, date, &now, &config.schedule.buffers())?;
            println!("Marked {} students absent for {} on {}", marked.len(), course, date);
        }
        Commands::Seed => {
            let db = open_database(&config, false)?;
            db.seed_defaults()?;
            println!("Seeded demo roster into {}", config.data_dir()?.display());
        }
        Commands::Config { show, set_api_key, delete_api_key, set_password } => {
            if let Some(key) = set_api_key {
                crate::security::set_api_key(&key)?;
                println!("Gemini API key stored securely.");
            } else if delete_api_key {
                crate::security::delete_api_key()?;
                println!("Gemini API key removed.");
            } else if set_password {
                use std::io::Write;
                eprint!("Enter lecturer password: ");
                std::io::stderr().flush()?;
                let password = read_hidden_line()?;
                eprint!("Confirm lecturer password: ");
                std::io::stderr().flush()?;
                let confirm = read_hidden_line()?;
                if password != confirm {
                    bail!("Passwords do not match.");
                }
                if password.is_empty() {
                    bail!("Password cannot be empty.");
                }
                config.auth.lecturer_password_hash = Some(auth::hash_password(&password));
                config.save_to(&config_path)?;
                println!("Lecturer password saved to {}", config_path.display());
            } else if show {
                config::show_config(&config, &config_path)?;
            } else {
                println!("Configuration options:");
                println!("  --show                 Display current configuration");
                println!("  --set-api-key <key>    Store your Gemini API key");
                println!("  --delete-api-key       Remove the stored Gemini API key");
                println!("  --set-password         Set the lecturer dashboard password");
                println!();
                println!("Other settings live in {}", config_path.display());
            }
        }
    }

    Ok(())
}

fn open_database(config: &Config, ephemeral: bool) -> Result<Database> {
    if ephemeral {
        return Ok(Database::in_memory());
    }
    let dir = config.data_dir()?;
    Database::open(&dir).with_context(|| format!("Failed to open data directory {}", dir.display()))
}

fn checkin_service(config: &Config, db: Arc<Database>, verifier: Arc<dyn FaceVerifier>) -> CheckInService {
    CheckInService::new(
        db,
        verifier,
        config.schedule.buffers(),
        Duration::from_secs(config.verification.timeout_secs),
    )
}

/// Read an image file into a data URL
fn encode_photo(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    if bytes.is_empty() {
        bail!("{} is empty", path.display());
    }
    let mime = match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    };
    Ok(format!("data:{};base64,{}", mime, BASE64.encode(bytes)))
}

/// Read a line from stdin with echo disabled
fn read_hidden_line() -> Result<String> {
    #[cfg(unix)]
    {
        use std::io::BufRead;
        let fd = 0;
        // SAFETY: termios is plain data and is restored before returning
        unsafe {
            let mut termios: libc::termios = std::mem::zeroed();
            let has_tty = libc::tcgetattr(fd, &mut termios) == 0;
            let original = termios;
            if has_tty {
                termios.c_lflag &= !libc::ECHO;
                libc::tcsetattr(fd, libc::TCSANOW, &termios);
            }

            let mut line = String::new();
            let result = std::io::stdin().lock().read_line(&mut line);

            if has_tty {
                libc::tcsetattr(fd, libc::TCSANOW, &original);
            }
            eprintln!();

            result?;
            Ok(line.trim().to_string())
        }
    }
    #[cfg(not(unix))]
    {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }
}
