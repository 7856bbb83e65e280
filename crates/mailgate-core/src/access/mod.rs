//! Permission and scope evaluation

pub mod permissions;
pub mod scope;
