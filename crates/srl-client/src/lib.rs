// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod session;

pub use config::SessionConfig;
pub use engine::{Engine, LayerHandle};
pub use session::{SessionError, SessionState};
