pub mod capture;
pub mod config;
pub mod info;
pub mod stats;
