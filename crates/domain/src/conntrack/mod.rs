pub mod entity;
pub mod error;
pub mod filter;
pub mod protocol;
