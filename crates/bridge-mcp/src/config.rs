//! Launch configuration for the tool server.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

fn default_tool_timeout() -> u64 {
    5_000
}

fn default_startup_timeout() -> u64 {
    30_000
}

fn default_shutdown_grace() -> u64 {
    5_000
}

fn default_python() -> String {
    "python".to_string()
}

fn default_node() -> String {
    "node".to_string()
}

/// Tunables for launching and talking to a tool server (`[server]` table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Deadline for a single `tools/call` in milliseconds (default: 5000).
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_ms: u64,
    /// Deadline for the handshake and other control requests (default: 30000).
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_ms: u64,
    /// How long to wait for a clean exit before killing (default: 5000).
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_ms: u64,
    /// Interpreter used for `.py` server scripts.
    #[serde(default = "default_python")]
    pub python: String,
    /// Interpreter used for `.js` server scripts.
    #[serde(default = "default_node")]
    pub node: String,
    /// Discard the server's stderr instead of passing it through.
    #[serde(default)]
    pub quiet_stderr: bool,
    /// Extra environment variables for the server process.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            tool_timeout_ms: default_tool_timeout(),
            startup_timeout_ms: default_startup_timeout(),
            shutdown_grace_ms: default_shutdown_grace(),
            python: default_python(),
            node: default_node(),
            quiet_stderr: false,
            env: HashMap::new(),
        }
    }
}

/// A fully resolved command line for the tool server process.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerCommand {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub tool_timeout: Duration,
    pub startup_timeout: Duration,
    pub shutdown_grace: Duration,
    pub quiet_stderr: bool,
}

impl ServerCommand {
    /// Resolve the user's positional arguments into a command line.
    ///
    /// A lone `*.py` or `*.js` path runs under the configured interpreter;
    /// anything else is executed directly with the remaining arguments.
    /// Returns `None` when `program` is empty.
    pub fn resolve(program: &str, rest: &[String], settings: &ServerSettings) -> Option<Self> {
        let program = program.trim();
        if program.is_empty() {
            return None;
        }

        let interpreter = if program.ends_with(".py") {
            Some(settings.python.clone())
        } else if program.ends_with(".js") {
            Some(settings.node.clone())
        } else {
            None
        };

        let (command, args) = match interpreter {
            Some(interp) => {
                let mut args = vec![program.to_string()];
                args.extend(rest.iter().cloned());
                (interp, args)
            }
            None => (program.to_string(), rest.to_vec()),
        };

        Some(Self {
            command,
            args,
            env: settings.env.clone(),
            tool_timeout: Duration::from_millis(settings.tool_timeout_ms),
            startup_timeout: Duration::from_millis(settings.startup_timeout_ms),
            shutdown_grace: Duration::from_millis(settings.shutdown_grace_ms),
            quiet_stderr: settings.quiet_stderr,
        })
    }

    /// The command line as a single display string.
    pub fn display(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_script_uses_interpreter() {
        let cmd = ServerCommand::resolve("weather.py", &[], &ServerSettings::default()).unwrap();
        assert_eq!(cmd.command, "python");
        assert_eq!(cmd.args, vec!["weather.py".to_string()]);
        assert_eq!(cmd.tool_timeout, Duration::from_millis(5000));
    }

    #[test]
    fn node_script_uses_configured_node() {
        let settings = ServerSettings {
            node: "/usr/local/bin/node".into(),
            ..ServerSettings::default()
        };
        let cmd = ServerCommand::resolve("build/index.js", &["--stdio".into()], &settings).unwrap();
        assert_eq!(cmd.command, "/usr/local/bin/node");
        assert_eq!(cmd.args, vec!["build/index.js".to_string(), "--stdio".to_string()]);
    }

    #[test]
    fn plain_executable_keeps_trailing_args() {
        let rest = vec!["-y".to_string(), "@playwright/mcp@latest".to_string()];
        let cmd = ServerCommand::resolve("npx", &rest, &ServerSettings::default()).unwrap();
        assert_eq!(cmd.command, "npx");
        assert_eq!(cmd.args, rest);
        assert_eq!(cmd.display(), "npx -y @playwright/mcp@latest");
    }

    #[test]
    fn empty_program_is_rejected() {
        assert!(ServerCommand::resolve("  ", &[], &ServerSettings::default()).is_none());
    }

    #[test]
    fn parse_server_settings_from_toml() {
        let toml_str = r#"
tool_timeout_ms = 15000
python = "python3"
quiet_stderr = true
env = { WEATHER_API_KEY = "abc" }
"#;
        let settings: ServerSettings = toml::from_str(toml_str).unwrap();
        assert_eq!(settings.tool_timeout_ms, 15000);
        assert_eq!(settings.startup_timeout_ms, 30000);
        assert_eq!(settings.python, "python3");
        assert_eq!(settings.node, "node");
        assert!(settings.quiet_stderr);
        assert_eq!(settings.env["WEATHER_API_KEY"], "abc");
    }
}
