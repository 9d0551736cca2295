/* src/lib.rs */

// Re-export modules for both binary and tests
pub mod error;
pub mod lifecycle;
pub mod logger;
pub mod parse;
pub mod prefix;
pub mod runtime;
pub mod spec;

pub use error::{ConfigError, SupervisorError};
pub use lifecycle::{run_until_signal, ShutdownSignals};
pub use prefix::PrefixedWriter;
pub use runtime::{RunningHandle, Supervisor, SupervisorConfig};
pub use spec::ProcessSpec;
