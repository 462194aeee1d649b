pub mod core;
pub mod datastore;
pub mod directory;
pub mod main_module;
pub mod tasks;
