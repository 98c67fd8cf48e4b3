//! Plan gateway operations and caller identity for plangate.

pub mod gateway;
pub mod identity;
