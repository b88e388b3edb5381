// src/lightswarm/mod.rs

pub mod agent;
pub mod client_wrapper;
pub mod config;
pub mod error;
pub mod event;
pub mod group_chat;
pub mod message;
pub mod routing;
pub mod session;
pub mod swarm;
pub mod task_graph;
pub mod termination;

// Let's explicitly export Swarm so we don't have to access it via lightswarm::swarm::Swarm
// and instead as lightswarm::Swarm
pub use swarm::Swarm;
