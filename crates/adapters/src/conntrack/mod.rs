pub mod proc_parser;
pub mod proc_table;
