pub mod prelude;

pub mod upload_sessions;
