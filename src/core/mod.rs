//! Domain layer: services, session handling, prompt assembly, throttling and the
//! text-generation contract.

pub mod context;
pub mod error;
pub mod gateway;
pub mod rate_limit;
pub mod services;
pub mod session;
pub mod traits;
