//! Hit construction.
//!
//! This module contains:
//! - Parameter values, options and the persistent / volatile buffer
//! - Percent-encoding and hashing helpers
//! - The consent filter applied to every hit
//! - The builder that assembles and slices hit URLs

pub mod buffer;
pub mod builder;
pub mod encoding;
pub mod param;
pub mod privacy;

// Re-export commonly used types
pub use buffer::Buffer;
pub use builder::{build_configuration, Builder, HIT_MAX_LENGTH, MHERR};
pub use param::{Param, ParamOption, ParamValue, RelativePosition, ValueSource};
pub use privacy::{FormattedParam, Privacy, PrivacyError, PrivacyMode};
