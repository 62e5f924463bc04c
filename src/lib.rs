//! QR-code attendance: the instructor-side client core and the reference
//! authority it talks to.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod docs;
pub mod error;
pub mod model;
pub mod models;
pub mod notice;
pub mod routes;
pub mod session;
pub mod store;
pub mod sync;
pub mod token;
pub mod undo;
pub mod utils;
pub mod view;
