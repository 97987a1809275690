//! Reliability infrastructure shared by every component that calls out to
//! an external collaborator: model providers (`cadence-intelligence`), the
//! job queue, the blacklist store. Provides admission control, breaker
//! protection, and cooperative shutdown.

pub mod circuit_breaker;
pub mod rate_limiter;
pub mod shutdown;
