pub mod conntrack_dumper;
