// src/lib.rs
pub mod broadcast;
pub mod canonical;
pub mod errors;
pub mod mention_graph;
pub mod models;
pub mod pipeline;
pub mod similarity;
pub mod utils;
