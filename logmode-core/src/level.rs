use std::fmt;

/// Severity a log call is issued at. Every mode says, per level, whether the
/// level is routed anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
    Audit,
}

impl Level {
    pub const COUNT: usize = 5;
    pub const ALL: [Level; Level::COUNT] = [
        Level::Debug,
        Level::Info,
        Level::Warn,
        Level::Error,
        Level::Audit,
    ];

    /// Position of the level in [`Level::ALL`].
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Audit => "AUDIT",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<log::Level> for Level {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Level::Error,
            log::Level::Warn => Level::Warn,
            log::Level::Info => Level::Info,
            log::Level::Debug | log::Level::Trace => Level::Debug,
        }
    }
}

#[test]
fn test_level_indices_follow_all() {
    for (i, level) in Level::ALL.iter().enumerate() {
        assert_eq!(level.index(), i);
    }
    assert_eq!(Level::from(log::Level::Trace), Level::Debug);
    assert_eq!(Level::Audit.to_string(), "AUDIT");
}
