pub mod client_ip;
pub mod time;

pub use client_ip::*;
pub use time::*;
