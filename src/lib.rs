//! Live public-transit vehicle map for the Warsaw open-data API.
//!
//! [`api::WarsawClient`] polls vehicle positions, [`policy::RefreshPolicy`]
//! decides when to poll and what to show, and [`screen::spawn`] runs the
//! policy against a [`screen::Presentation`] on the tokio runtime.

pub mod api;
pub mod config;
pub mod lines;
pub mod models;
pub mod policy;
pub mod screen;
pub mod viewport;
