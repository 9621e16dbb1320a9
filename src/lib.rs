// src/lib.rs

pub mod address;
pub mod canonical;
pub mod config;
pub mod db;
pub mod geocoding;
pub mod ingest;
pub mod matching;
pub mod models;
pub mod pipeline;
pub mod quality;
pub mod results;
