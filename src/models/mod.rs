//! Domain model module declarations.

pub mod permission;
pub mod protocol;
pub mod session;
