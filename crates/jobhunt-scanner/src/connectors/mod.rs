//! Source connectors.
//!
//! Every connector implements [`jobhunt_core::Fetcher`]. The ATS connectors
//! fan out over their configured companies through [`pool::run_companies`]
//! and share one [`crate::limiter::HostLimiter`].

pub mod greenhouse;
pub mod lever;
pub mod pool;
pub mod smartrecruiters;
pub mod workday;

pub use greenhouse::GreenhouseConnector;
pub use lever::LeverConnector;
pub use smartrecruiters::SmartRecruitersConnector;
pub use workday::WorkdayConnector;
