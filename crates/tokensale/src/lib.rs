//! Registration backend for a token sale.
//!
//! Applicants apply by email, exchange a short-lived temporary token for a server-held session
//! capability, finalize registration, and then submit a participation address. The HTTP surface
//! lives in [`applicants::router`]; everything it calls is usable without a server.

pub mod applicants;
pub mod boundary;
pub mod config;
pub mod error;
pub mod mail;
pub mod sale;
pub mod telemetry;
pub mod tokens;
