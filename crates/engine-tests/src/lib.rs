#![allow(dead_code)]

pub mod acknowledgment;
pub mod utils;
