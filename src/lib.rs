//! Attendify - course attendance library
//!
//! Schedule-aware student check-in with remote face verification:
//! - Check-in windows derived from each course's start time and buffers
//! - Identity checks delegated to a Gemini vision model
//! - One record per student, course and day
//! - Lecturer dashboard and session close-out
//! - JSON file storage and an HTTP API with JWT-protected lecturer routes
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use attendify::{CheckInService, Database, StaticVerifier};
//! use attendify::checkin::CheckInRequest;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let service = CheckInService::new(
//!         Arc::new(Database::in_memory()),
//!         Arc::new(StaticVerifier::accepting(0.9)),
//!         Default::default(),
//!         Duration::from_secs(15),
//!     );
//!     let request = CheckInRequest {
//!         student_id: "1".into(),
//!         course_id: None,
//!         image: "data:image/jpeg;base64,...".into(),
//!     };
//!     let outcome = service.check_in(request, chrono::Local::now().fixed_offset()).await?;
//!     println!("{}", outcome.record.status);
//!     Ok(())
//! }
//! ```

pub mod types;
pub mod schedule;
pub mod store;
pub mod verify;
pub mod checkin;
pub mod analytics;
pub mod config;
pub mod security;
pub mod server;
pub mod cli;

pub use checkin::{CheckInError, CheckInService};
pub use config::Config;
pub use store::Database;
pub use types::{AttendanceRecord, AttendanceStatus, Course, Student, VerificationResult};
pub use verify::{FaceVerifier, GeminiVerifier, StaticVerifier};
pub use server::{router, AppState, start as start_server};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
