//! JobHunt Mail - the mailbox feed.
//!
//! Reads unseen LinkedIn job-alert digests over IMAP, decodes their MIME
//! bodies and turns each job card into a [`jobhunt_core::JobLead`].
//!
//! # Modules
//!
//! - [`imap`] - Blocking IMAP sessions (search, peek-fetch, mark seen)
//! - [`mime`] - Best-effort RFC 822 / MIME body extraction
//! - [`linkedin`] - Digest detection and job-card parsing
//! - [`fetcher`] - [`EmailFetcher`], the `Fetcher` implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod error;
pub mod fetcher;
pub mod imap;
pub mod linkedin;
pub mod mime;

pub use error::{MailError, Result};
pub use fetcher::EmailFetcher;
pub use linkedin::LinkedInJob;
pub use mime::ParsedMessage;
