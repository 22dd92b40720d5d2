pub mod blob_store;
pub mod database;
pub mod identity;
