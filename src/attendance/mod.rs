//! Attendance recording and plan consumption.
//!
//! Saving attendance consumes one class from the oldest plan with spare
//! capacity for each present student, and returns the credit of students
//! marked absent.

pub mod calculators;
pub mod models;
pub mod queries;
pub mod requests;
pub mod responses;
pub mod routes;
pub mod services;

pub use calculators::{AttendanceSheet, SheetState};
pub use routes::router;
pub use services::AttendanceError;
