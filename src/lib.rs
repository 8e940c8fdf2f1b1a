use std::sync::Arc;

pub mod autoscaling;
pub mod aws;
pub mod clock;
pub mod config;
pub mod eks;
pub mod error;
pub mod kubernetes;
pub mod node_groups;

pub type AppConfig = Arc<config::Config>;
