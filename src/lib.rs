//! Bulk-load CSV records into Elasticsearch or Manticore and search
//! them by name and address.

pub mod backend;
pub mod cli;
pub mod loader;
pub mod models;
pub mod search;
pub mod server;
