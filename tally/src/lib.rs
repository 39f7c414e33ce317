// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! The tally HTTP service: identity cookies, admin sessions and the routes
//! that front the vote ledger.

pub mod admin;
pub mod api;
pub mod config;
pub mod identity;

pub use admin::AdminSessions;
pub use api::{AppState, HttpResponse, ResponseBody, handle, serve};
pub use config::{ConfigError, Environment, RuntimeConfig};
