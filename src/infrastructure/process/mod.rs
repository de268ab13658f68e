pub mod command_stage;
