//! Polling loop and scrape status for the JobHunt engine.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod poller;
pub mod status;

pub use poller::{CycleRunner, Poller, Skipped};
pub use status::{ScrapeStatus, StatusRegister};
