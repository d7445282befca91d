// Check engine library: data acquisition, caching, section merge and plugin dispatch

mod blob;

pub mod config;
pub mod connector;
pub mod error;
pub mod fetch_cache;
pub mod models;
pub mod piggyback;
pub mod plugins;
pub mod registry;
pub mod result_store;
pub mod routes;
pub mod scheduler;
pub mod sections;
pub mod version;
pub mod worker;
