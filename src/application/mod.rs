pub mod actions;
pub mod monitor;
