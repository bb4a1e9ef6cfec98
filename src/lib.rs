pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
mod http;
pub mod lookup;
pub mod names;
pub mod ncbi;
pub mod output;
pub mod store;
pub mod taxonomy;
pub mod uniprot;
