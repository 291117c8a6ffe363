pub mod ack;
pub mod error;
pub mod importer;
pub mod registry;
pub mod socket;
