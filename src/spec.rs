use std::time::Duration;

/// Delay applied between restarts when a spec leaves `restart_delay` at zero.
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(5);

/*
    @@@
    @ProcessSpec;
    . Immutable description of one supervised unit, built once by the caller.
    . `critical` specs gate the startup of every spec listed after them.
    . A zero `restart_delay` falls back to the supervisor's default delay.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub critical: bool,
    pub restart_delay: Duration,
}

impl ProcessSpec {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            critical: false,
            restart_delay: Duration::ZERO,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    pub fn restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    /// Delay to wait before the next launch attempt, never zero.
    pub fn effective_restart_delay(&self, default: Duration) -> Duration {
        if self.restart_delay.is_zero() {
            default
        } else {
            self.restart_delay
        }
    }

    /// Prefix stamped on every line this process writes to stdout/stderr.
    pub fn output_prefix(&self) -> String {
        format!("[{}] ", self.name)
    }
}
