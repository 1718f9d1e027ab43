pub mod analytics;
pub mod price_api;
pub mod sim_chain;
