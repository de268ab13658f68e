pub mod manifest;
pub mod run;
pub mod stage;
