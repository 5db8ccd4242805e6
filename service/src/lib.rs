//! Process-level plumbing shared by the server binary and the `web` crate:
//! command line / environment configuration and console logging.

pub mod config;
pub mod logging;
