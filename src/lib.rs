//! Back-office toolkit for a jewelry shop: invoice arithmetic, printable agreements,
//! spreadsheet exports and a client for the shop's REST backend.

pub mod api;
pub mod builder;
pub mod calc;
pub mod config;
pub mod contract;
pub mod draft;
pub mod error;
pub mod export;
pub mod format;
pub mod layout;
pub mod model;
pub mod status;
pub mod table;

pub use error::{Error, Result};
