pub mod action;
pub mod apr;
pub mod cache;
pub mod entity;
pub mod orchestrator;
pub mod price;
pub mod reader;
