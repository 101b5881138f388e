pub mod animals;
pub mod batch;
pub mod build;
pub mod config;
pub mod graph;
pub mod validate;
