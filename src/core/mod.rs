//! Core workspace logic: types, codec, settings store, engine commands, workspace.

pub mod codec;
pub mod commands;
pub mod error;
pub mod store;
pub mod types;
pub mod workspace;
