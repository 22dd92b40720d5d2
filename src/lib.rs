//! Points marketplace: members spend points on products with tracked stock.

pub mod adapters;
pub mod api;
pub mod commands;
pub mod config;
pub mod domain;
pub mod observability;
pub mod ports;
