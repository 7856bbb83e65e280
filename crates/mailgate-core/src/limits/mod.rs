//! Rate limiting and login lock-out

pub mod lockout;
pub mod rate_limiter;
