#![forbid(unsafe_code)]

pub mod conntrack_dumper_impl;
pub mod conntrack_service_impl;
