//! Request logging and retention

pub mod logger;
pub mod retention;
