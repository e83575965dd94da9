use std::sync::LazyLock;

use derive_from_env::FromEnv;

#[derive(FromEnv)]
#[from_env(prefix = "LOGMODE")]
#[allow(non_snake_case)]
pub struct LogModeConfig {
    /// Disposal failures kept for [`Engine::disposal_reports`](crate::Engine::disposal_reports)
    /// before newer ones are dropped.
    #[from_env(default = "64")]
    pub DISPOSAL_REPORT_CAPACITY: usize,
    /// Mode forced when a preset is initialised.
    #[from_env(default = "0")]
    pub INITIAL_MODE: usize,
    /// Whether presets listen for control signals.
    #[from_env(default = "true")]
    pub SIGNAL_CONTROL: bool,
}

pub static LOGMODE_CONFIG: LazyLock<LogModeConfig> = LazyLock::new(|| {
    LogModeConfig::from_env().expect("Invalid LOGMODE_* environment configuration")
});
