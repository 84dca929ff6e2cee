mod common;

mod config_validation;
mod history_store;
