//! Platform billing of academies: per-student rates, monthly invoices,
//! invoice payments and sales agent commissions.

pub mod calculators;
pub mod models;
pub mod queries;
pub mod requests;
pub mod responses;
pub mod routes;
pub mod services;

pub use calculators::round_money;
pub use routes::router;
pub use services::BillingError;
