pub mod chunk_store;
pub mod completion;
pub mod session_registry;
pub mod upload_service;
pub mod worker;
