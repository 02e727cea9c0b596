use std::path::Path;

use domain::conntrack::entity::Connection;
use domain::conntrack::filter::FilterStats;
use infrastructure::config::{AgentConfig, LogFormat};
use infrastructure::logging::init_logging;
use ports::primary::conntrack_dumper::ConnTrackDumper;
use serde::Serialize;

use crate::cli::Cli;
use crate::startup::build_dumper;

/// One zone of `ctflow-agent dump` output.
#[derive(Debug, Serialize)]
pub struct ZoneDump {
    pub zone: u16,
    pub stats: FilterStats,
    pub connections: Vec<Connection>,
}

/// Dump the configured (or requested) zones once and print them as JSON.
///
/// Logs go to stderr so stdout stays valid JSON.
pub fn cmd_dump(cli: &Cli, zone: Option<u16>) -> anyhow::Result<()> {
    let config = AgentConfig::load(Path::new(&cli.config))?;
    let log_level = cli.log_level.unwrap_or(config.agent.log_level);
    init_logging(log_level, LogFormat::Text)?;

    let dumper = build_dumper(&config)?;
    let zones = zone.map_or_else(|| config.zones(), |z| vec![z]);
    let dumps = dump_zones(dumper.as_ref(), &zones)?;
    println!("{}", serde_json::to_string_pretty(&dumps)?);
    Ok(())
}

/// Dump each zone in order; the first failure aborts.
pub fn dump_zones(dumper: &dyn ConnTrackDumper, zones: &[u16]) -> anyhow::Result<Vec<ZoneDump>> {
    zones
        .iter()
        .map(|&zone| {
            let dump = dumper.dump_flows(zone)?;
            Ok::<_, anyhow::Error>(ZoneDump {
                zone,
                stats: dump.stats,
                connections: dump.connections,
            })
        })
        .collect()
}
