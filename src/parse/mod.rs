mod config;

pub use config::{parse_str, parser, Config, ProgramConfig};
