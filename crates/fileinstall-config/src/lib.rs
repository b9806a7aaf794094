//! # fileinstall-config
//!
//! Master configuration for fileinstall.
//!
//! - [`Conf`] - Typed master configuration, local `fileinstall.yaml` merged over the bundled default
//! - [`CheckFlags`] - The four health check switches and their cross-master aggregation
//! - [`render`] - Flat `key=value` descriptor rendering and variable substitution

pub mod conf;
pub mod render;

pub use conf::{BUNDLED_CONF, CONF_FILE, CheckFlags, Conf, extract_default};
pub use render::{Variables, render_flat};
