//! Map, table and bar chart over a CSV of geocoded events.

pub mod types;
pub mod config;
pub mod error;
pub mod data;
pub mod table;
pub mod selection;
pub mod figure;
pub mod map;
pub mod bar;
pub mod sync;
pub mod session;
pub mod server;
