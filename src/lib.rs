//! Devaults - yield vault & farm state refresh engine
//! Built with Domain-Driven Design principles

pub mod app;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod shared;

// Re-export main types for convenience
pub use application::actions::ActionService;
pub use application::monitor::RefreshMonitor;
pub use domain::cache::SnapshotCache;
pub use domain::orchestrator::RefreshOrchestrator;
pub use domain::price::PairAwareOracle;
pub use infrastructure::sim_chain::SimChain;
