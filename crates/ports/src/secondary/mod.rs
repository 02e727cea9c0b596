pub mod conntrack_table_port;
pub mod metrics_port;
