pub mod parameter_store;
pub mod run_history;
