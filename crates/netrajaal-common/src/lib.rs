#![no_std]

pub mod devlog;
pub mod link;
pub mod rng;
pub mod time;

pub use log as __log;
