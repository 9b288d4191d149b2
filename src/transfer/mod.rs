//! Retrieval collaborator
//!
//! The scheduler only sees the [`Transfer`] trait. Two implementations ship with the crate:
//!
//! - [`FtpTransfer`]: drives the system `ftp` client against the mainframe
//! - [`UnavailableTransfer`]: fails every fetch, used when no client is configured
//!
//! ## Usage
//!
//! ```no_run
//! use dsmig::transfer::{FtpTransfer, LayoutHints, Transfer};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ftp = FtpTransfer::from_path("zos.example.com").expect("ftp not found");
//!     let report = ftp
//!         .fetch("HLQ.PAYROLL.DATA", &LayoutHints::default(), Path::new("datasets"))
//!         .await?;
//!     println!("{} bytes", report.bytes);
//!     Ok(())
//! }
//! ```

mod ftp;
mod noop;
mod parser;
mod traits;

pub use ftp::FtpTransfer;
pub use noop::UnavailableTransfer;
pub use traits::{FetchReport, LayoutHints, Transfer};
