// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod notice;
pub mod store;

pub use engine::process_remote_updates;
pub use notice::Notice;
pub use store::{DeltaFrame, LayerStore, StoreError};
