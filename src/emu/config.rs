use std::time::Duration;

pub const DEFAULT_CPU_HZ: u32 = 600;
pub const TIMER_HZ: u32 = 60;

/// Emulator settings fixed for the lifetime of a worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmulatorConfig {
    /// Instructions executed per second.
    pub cpu_hz: u32,
    /// Delay/sound timer decrements per second.
    pub timer_hz: u32,
    /// Send per-instruction and lifecycle lines to the trace sink.
    pub trace: bool,
    /// Fire the sound trigger while the sound timer runs.
    pub sound: bool,
    /// Seed for `Cxnn`; `None` seeds from the OS.
    pub seed: Option<u64>,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("CPU rate must be at least 1 Hz")]
    ZeroCpuRate,
    #[error("Timer rate must be at least 1 Hz")]
    ZeroTimerRate,
}

impl EmulatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cpu_hz == 0 {
            return Err(ConfigError::ZeroCpuRate);
        }
        if self.timer_hz == 0 {
            return Err(ConfigError::ZeroTimerRate);
        }
        Ok(())
    }

    pub fn cpu_period(&self) -> Duration {
        Duration::from_secs(1) / self.cpu_hz.max(1)
    }

    pub fn timer_period(&self) -> Duration {
        Duration::from_secs(1) / self.timer_hz.max(1)
    }
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            cpu_hz: DEFAULT_CPU_HZ,
            timer_hz: TIMER_HZ,
            trace: false,
            sound: true,
            seed: None,
        }
    }
}
