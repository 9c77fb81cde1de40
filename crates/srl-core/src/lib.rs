// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod path;
pub mod spec;
pub mod token;
pub mod value;

pub use codec::DecodeError;
pub use path::ScenePath;
pub use spec::{Field, SpecData, SpecType};
pub use token::{Token, fields};
pub use value::{
    AssetPath, Dictionary, LayerOffset, ListOp, Matrix4d, Reference, Specifier, TimeSampleMap,
    Value, Variability,
};
