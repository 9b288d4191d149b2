//! Decode/load collaborator
//!
//! The scheduler only sees the [`Converter`] trait. Implementations:
//!
//! - [`DsmiginConverter`]: generates a schema with `cobgensch` and loads with `dsmigin`
//!   (plus `idcams` for VSAM clusters)
//! - [`UnavailableConverter`]: fails every conversion, used when the tools are missing
//!
//! [`LayoutDescription`] bundles what a converter needs to know about a dataset: its layout
//! columns and the copybook resolved in the copybook directory.

mod dsmigin;
mod noop;
mod traits;

pub use dsmigin::DsmiginConverter;
pub use noop::UnavailableConverter;
pub use traits::{ConvertMode, ConvertReport, Converter, LayoutDescription};
