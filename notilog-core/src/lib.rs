#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod bus;
pub mod config;
pub mod entities;
pub mod events;
pub mod feed;
pub mod framework;
pub mod notification;
pub mod processors;
pub mod store;
pub mod tracker;
pub mod utils;
