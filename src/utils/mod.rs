pub mod checksum;
pub mod keyed_mutex;
pub mod metadata;
