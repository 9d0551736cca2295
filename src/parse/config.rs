use crate::error::ConfigError;
use crate::runtime::SupervisorConfig;
use crate::spec::ProcessSpec;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_shutdowntime() -> u64 { 30 }
fn default_stabilizetime() -> u64 { 1 }
fn default_restartdelay() -> u64 { 5 }

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ProgramConfig {
    pub name: String,
    pub cmd: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub critical: bool,
    /// Seconds; 0 falls back to the top-level `restartdelay`.
    #[serde(default)]
    pub restartdelay: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Config {
    #[serde(default = "default_shutdowntime")]
    pub shutdowntime: u64,
    #[serde(default = "default_stabilizetime")]
    pub stabilizetime: u64,
    #[serde(default = "default_restartdelay")]
    pub restartdelay: u64,
    #[serde(default)]
    pub logdir: Option<PathBuf>,
    pub processes: Vec<ProgramConfig>,
}

impl Default for Config {
    /// The stock deployment: an RPC server that must bind its socket first, then its client.
    fn default() -> Self {
        Self {
            shutdowntime: default_shutdowntime(),
            stabilizetime: default_stabilizetime(),
            restartdelay: default_restartdelay(),
            logdir: None,
            processes: vec![
                ProgramConfig {
                    name: "grpc-server".into(),
                    cmd: "/app/server".into(),
                    args: Vec::new(),
                    critical: true,
                    restartdelay: 5,
                },
                ProgramConfig {
                    name: "grpc-client".into(),
                    cmd: "/app/client".into(),
                    args: Vec::new(),
                    critical: false,
                    restartdelay: 5,
                },
            ],
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processes.is_empty() {
            return Err(ConfigError::Empty);
        }
        let mut seen = HashSet::new();
        for (idx, prog) in self.processes.iter().enumerate() {
            if prog.name.trim().is_empty() {
                return Err(ConfigError::EmptyName(idx));
            }
            if !seen.insert(prog.name.as_str()) {
                return Err(ConfigError::DuplicateName(prog.name.clone()));
            }
            if prog.cmd.trim().is_empty() {
                return Err(ConfigError::EmptyCommand(prog.name.clone()));
            }
        }
        Ok(())
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            shutdown_timeout: Duration::from_secs(self.shutdowntime),
            stabilize_interval: Duration::from_secs(self.stabilizetime),
            default_restart_delay: Duration::from_secs(self.restartdelay),
            ..SupervisorConfig::default()
        }
    }

    /// Specs in declaration order; startup order follows the file.
    pub fn process_specs(&self) -> Vec<ProcessSpec> {
        self.processes
            .iter()
            .map(|p| {
                ProcessSpec::new(&p.name, &p.cmd)
                    .args(p.args.iter().cloned())
                    .critical(p.critical)
                    .restart_delay(Duration::from_secs(p.restartdelay))
            })
            .collect()
    }
}



/*
    @@@
    @parser();
    . Reads the config file into a String; I/O errors come back tagged with the path.
    . Hands the text to parse_str() which deserializes with serde_yaml and validates names and commands.
*/
pub fn parser(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let yaml_file = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_str(&yaml_file)
}

pub fn parse_str(yaml: &str) -> Result<Config, ConfigError> {
    let parsed_config: Config = serde_yaml::from_str(yaml)?;
    parsed_config.validate()?;
    Ok(parsed_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
shutdowntime: 10
logdir: /var/log/procvisor
processes:
  - name: grpc-server
    cmd: /app/server
    critical: true
    restartdelay: 2
  - name: grpc-client
    cmd: /app/client
    args: ["--target", "unix:///tmp/grpc.sock"]
"#;

    #[test]
    fn parses_ordered_processes() {
        let cfg = parse_str(SAMPLE).unwrap();
        assert_eq!(cfg.shutdowntime, 10);
        assert_eq!(cfg.stabilizetime, 1);
        assert_eq!(cfg.restartdelay, 5);
        assert_eq!(cfg.logdir, Some(PathBuf::from("/var/log/procvisor")));

        let specs = cfg.process_specs();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].name, "grpc-server");
        assert!(specs[0].critical);
        assert_eq!(specs[0].restart_delay, Duration::from_secs(2));
        assert_eq!(specs[1].name, "grpc-client");
        assert!(!specs[1].critical);
        assert!(specs[1].restart_delay.is_zero());
        assert_eq!(specs[1].args, vec!["--target", "unix:///tmp/grpc.sock"]);
    }

    #[test]
    fn supervisor_timings_follow_config() {
        let cfg = parse_str(SAMPLE).unwrap();
        let sup = cfg.supervisor_config();
        assert_eq!(sup.shutdown_timeout, Duration::from_secs(10));
        assert_eq!(sup.stabilize_interval, Duration::from_secs(1));
        assert_eq!(sup.default_restart_delay, Duration::from_secs(5));
    }

    #[test]
    fn rejects_duplicate_names() {
        let yaml = "processes:\n  - {name: a, cmd: /bin/true}\n  - {name: a, cmd: /bin/false}\n";
        assert!(matches!(parse_str(yaml), Err(ConfigError::DuplicateName(n)) if n == "a"));
    }

    #[test]
    fn rejects_empty_command_and_list() {
        let yaml = "processes:\n  - {name: a, cmd: ''}\n";
        assert!(matches!(parse_str(yaml), Err(ConfigError::EmptyCommand(_))));
        assert!(matches!(parse_str("processes: []\n"), Err(ConfigError::Empty)));
    }

    #[test]
    fn rejects_malformed_yaml() {
        assert!(matches!(parse_str("processes: [name"), Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = parser("/nonexistent/procvisor.yml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/procvisor.yml"));
    }

    #[test]
    fn reads_config_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("procvisor.yml");
        std::fs::write(&path, SAMPLE).unwrap();

        let cfg = parser(&path).unwrap();
        assert_eq!(cfg.processes.len(), 2);
        assert_eq!(parser(path.as_path()).unwrap(), cfg);
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        cfg.validate().unwrap();
        let specs = cfg.process_specs();
        assert!(specs[0].critical);
        assert_eq!(specs[1].command, "/app/client");
    }
}
