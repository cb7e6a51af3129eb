pub mod accuracy;
pub mod app;
pub mod config;
pub mod fetch;
pub mod forecast;
pub mod geo;
pub mod jobs;
pub mod location_code;
pub mod monitor;
pub mod output;
pub mod publish;
pub mod radar;
pub mod roster;
pub mod scheduler;
pub mod sensors;
pub mod store;
pub mod views;
