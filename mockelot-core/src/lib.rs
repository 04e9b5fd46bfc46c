//! Ambient runtime support shared by the mockelot binary and library: graceful
//! shutdown/draining, readiness tracking, signal handling, logging setup and
//! build metadata. Modeled after the equivalent foundation crate in larger
//! Rust gateways: small, dependency-light, and reused by every other crate.

pub mod drain;
pub mod prelude;
pub mod readiness;
pub mod signal;
pub mod telemetry;
pub mod version;
