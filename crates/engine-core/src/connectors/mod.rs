pub mod channel;
pub mod memory;
pub mod sink;
