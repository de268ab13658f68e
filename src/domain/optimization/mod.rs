pub mod parameter_set;
