pub mod executor;
pub mod spawn;
