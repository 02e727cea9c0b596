#![forbid(unsafe_code)]

pub mod conntrack;
pub mod http;
