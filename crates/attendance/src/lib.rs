pub mod app;
pub mod config;
pub mod file_store;
pub mod identity_provider;
pub mod software_authenticator;
