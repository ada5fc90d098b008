pub mod database;
pub mod hooks;
pub mod storage;
