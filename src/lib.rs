pub mod app;
pub mod cache;
pub mod config;
pub mod curated;
pub mod discover;
pub mod domain;
pub mod enrich;
pub mod error;
pub mod ncbi;
pub mod output;
pub mod reference;
pub mod tsv;
