//! Configuration validation

use super::StackConfig;
use crate::telemetry::{parse_level, LogFormat};
use tracing::{error, warn};

/// Longest interface name the kernel accepts (IFNAMSIZ - 1)
const MAX_IFNAME_LEN: usize = 15;

/// Queue capacities above this are accepted but flagged
const LARGE_QUEUE_CAPACITY: usize = 4096;

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Emit every diagnostic through the logger
    pub fn log_diagnostics(&self) {
        for warning in &self.warnings {
            warn!("{}", warning);
        }
        for err in &self.errors {
            error!("{}", err);
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &StackConfig) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_interface(config, &mut result);
    validate_addresses(config, &mut result);
    validate_tcp(config, &mut result);
    validate_log(config, &mut result);

    result
}

fn validate_interface(config: &StackConfig, result: &mut ValidationResult) {
    if config.interface.is_empty() {
        result.error("interface: name must not be empty");
    } else if config.interface.len() > MAX_IFNAME_LEN {
        result.error(format!(
            "interface: {:?} is longer than {} bytes",
            config.interface, MAX_IFNAME_LEN
        ));
    }

    if config.netns_dir.as_os_str().is_empty() {
        result.error("netns_dir: must not be empty");
    }
}

fn validate_addresses(config: &StackConfig, result: &mut ValidationResult) {
    match config.mac_addr() {
        Ok(mac) if mac.is_multicast() => {
            result.error(format!("mac: {} is a multicast address", mac));
        }
        Ok(_) => {}
        Err(e) => result.error(e.to_string()),
    }

    if config.ipv4.is_unspecified() || config.ipv4.is_multicast() || config.ipv4.is_broadcast() {
        result.error(format!("ipv4: {} is not a unicast address", config.ipv4));
    }
}

fn validate_tcp(config: &StackConfig, result: &mut ValidationResult) {
    let tcp = &config.tcp;

    if tcp.queue_capacity == 0 {
        result.error("tcp.queue_capacity: must be at least 1");
    } else if tcp.queue_capacity > LARGE_QUEUE_CAPACITY {
        result.warn(format!(
            "tcp.queue_capacity: {} is unusually large, every session reserves this much",
            tcp.queue_capacity
        ));
    }

    if tcp.window == 0 {
        result.warn("tcp.window: 0 advertises a closed window, peers will not send data");
    }

    if tcp.randomize_iss && tcp.initial_sequence != 12 {
        result.warn("tcp.initial_sequence: ignored because tcp.randomize_iss is set");
    }
}

fn validate_log(config: &StackConfig, result: &mut ValidationResult) {
    if parse_level(&config.log.level).is_none() {
        result.warn(format!(
            "log.level: unknown level {:?}, using info",
            config.log.level
        ));
    }

    if LogFormat::parse(&config.log.format).is_none() {
        result.warn(format!(
            "log.format: unknown format {:?}, using pretty",
            config.log.format
        ));
    }
}
