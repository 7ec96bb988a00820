//! # ttk CLI
//!
//! Command-line front end for the ttk SDK: browser login with PKCE, stored
//! credential management and authenticated calls to the TikTok APIs.
//!
//! ## Architecture
//!
//! - Clap-based argument parsing with derive macros
//! - Handler-based command processing
//! - Configuration and logging from `ttk-common`
//! - Every auth and HTTP behaviour lives in `ttk-sdk`

pub mod cli;
pub mod error;
pub mod output;
pub mod progress;

pub use cli::*;
pub use error::*;
