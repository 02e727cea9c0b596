#![no_main]

use libfuzzer_sys::fuzz_target;

use infrastructure::config::AgentConfig;

// Fuzz the configuration loader with arbitrary YAML.
//
// A document that passes validation must also convert to domain types
// and resolve to a non-empty, duplicate-free zone list.
fuzz_target!(|data: &[u8]| {
    let Ok(yaml) = std::str::from_utf8(data) else {
        return;
    };
    if yaml.len() > 64 * 1024 {
        return;
    }
    let Ok(config) = AgentConfig::from_yaml(yaml) else {
        return;
    };

    assert!(config.service_cidrs().is_ok());
    let _ = config.node_config();

    let zones = config.zones();
    assert!(!zones.is_empty());
    for (i, zone) in zones.iter().enumerate() {
        assert!(!zones[..i].contains(zone));
    }
    assert!(config.conntrack.poll_interval_secs > 0);
});
