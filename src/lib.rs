//! mvc_core library - database access and request dispatch for MVC web
//! applications
//!
//! Provides the database layer (drivers, result cursors, query builder,
//! connection registry, schema utilities, query cache) and the web layer
//! (URI parsing, routing, controller and module dispatch), plus the command
//! line front end used to exercise them.

pub mod cli;
pub mod commands;
pub mod config;
pub mod db;
pub mod logging;
pub mod output;
pub mod web;

#[macro_use]
pub mod test_macros;

#[cfg(test)]
pub mod test_utils;
