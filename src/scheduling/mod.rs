//! Class scheduling for academies.
//!
//! Courts are booked in whole hours between 06:00 and 22:00 academy-local
//! time. A session holds 1 to 4 students; its type and capacity follow from
//! the participant count.

pub mod calculators;
pub mod models;
pub mod queries;
pub mod requests;
pub mod responses;
pub mod routes;
pub mod services;

pub use routes::router;
pub use services::SchedulingError;
