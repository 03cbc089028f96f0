//! recruiter-sync — turns recruiter mail into tracking-board entries.

pub mod api;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod source;
pub mod store;
pub mod tracker;
