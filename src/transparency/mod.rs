//! Transparency module.
//!
//! Keeps a local, content-free record of how many hits the tracker built,
//! delivered and stored, so users can audit what was transmitted.

pub mod log;

pub use log::{
    create_shared_log_with_persistence, SharedTransparencyLog, TransparencyLog, TransparencyStats,
};
