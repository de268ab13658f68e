pub mod core;
pub mod http;
pub mod monitoring;
pub mod notifications;
pub mod observability;
pub mod persistence;
pub mod process;

pub use http::propagation_client::HttpPropagationClient;
pub use notifications::webhook_notifier::WebhookNotifier;
pub use persistence::parameter_store::ParameterStore;
pub use persistence::run_history::RunHistory;
pub use process::command_stage::CommandStage;
