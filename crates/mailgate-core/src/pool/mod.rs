//! Mailbox pool allocation

pub mod allocator;
