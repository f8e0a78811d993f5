// src/core/mod.rs

//! Resolution, validation and execution building blocks.

pub mod chain;
pub mod config_loader;
pub mod events;
pub mod flag_parser;
pub mod pipeline;
pub mod registry;
pub mod resolver;
