//! Fault injection for the in-memory drivers.
//!
//! Each fault has an identifier and a probability. Draws come from a seeded
//! RNG so a failing run can be replayed with the same seed.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// Driver call faults
pub mod driver {
    /// Connect/open fails
    pub const CONNECT_FAIL: &str = "driver.connect_fail";
    /// Liveness check fails
    pub const PING_FAIL: &str = "driver.ping_fail";
    /// Command returns an error
    pub const COMMAND_FAIL: &str = "driver.command_fail";
    /// Disconnect/close fails
    pub const CLOSE_FAIL: &str = "driver.close_fail";
}

/// Instrumentation event faults
pub mod events {
    /// Start event / before-hook never delivered
    pub const DROP_START: &str = "events.drop_start";
    /// Completion event delivered twice
    pub const DUPLICATE_COMPLETION: &str = "events.duplicate_completion";
}

#[derive(Debug, Clone)]
pub struct FaultConfig {
    pub enabled: bool,
    pub probabilities: HashMap<&'static str, f64>,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self::disabled()
    }
}

impl FaultConfig {
    /// Enabled, every fault at zero.
    pub fn new() -> Self {
        FaultConfig {
            enabled: true,
            probabilities: HashMap::new(),
        }
    }

    pub fn disabled() -> Self {
        FaultConfig {
            enabled: false,
            probabilities: HashMap::new(),
        }
    }

    /// Occasional command failures and lost events.
    pub fn chaos() -> Self {
        Self::new()
            .with(driver::COMMAND_FAIL, 0.10)
            .with(events::DROP_START, 0.05)
            .with(events::DUPLICATE_COMPLETION, 0.05)
    }

    pub fn with(mut self, fault_id: &'static str, probability: f64) -> Self {
        self.set(fault_id, probability);
        self
    }

    pub fn set(&mut self, fault_id: &'static str, probability: f64) -> &mut Self {
        self.probabilities
            .insert(fault_id, probability.clamp(0.0, 1.0));
        self
    }

    pub fn get(&self, fault_id: &str) -> f64 {
        if !self.enabled {
            return 0.0;
        }
        self.probabilities.get(fault_id).copied().unwrap_or(0.0)
    }

    pub fn should_trigger(&self, fault_id: &str, random_value: f64) -> bool {
        random_value < self.get(fault_id)
    }
}

/// Shared, mutable fault switchboard for one driver.
pub struct FaultInjector {
    config: Mutex<FaultConfig>,
    rng: Mutex<StdRng>,
}

impl FaultInjector {
    pub fn new(config: FaultConfig, seed: u64) -> Self {
        FaultInjector {
            config: Mutex::new(config),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Force a fault on (`1.0`) or off (`0.0`), or anything in between.
    pub fn set(&self, fault_id: &'static str, probability: f64) {
        let mut config = self.config.lock();
        config.enabled = true;
        config.set(fault_id, probability);
    }

    pub fn clear(&self) {
        *self.config.lock() = FaultConfig::disabled();
    }

    pub fn fires(&self, fault_id: &str) -> bool {
        let config = self.config.lock();
        let probability = config.get(fault_id);
        if probability <= 0.0 {
            return false;
        }
        let draw: f64 = self.rng.lock().gen();
        config.should_trigger(fault_id, draw)
    }
}

impl Default for FaultInjector {
    fn default() -> Self {
        Self::new(FaultConfig::disabled(), 0)
    }
}
