//! Provides a means to read, parse and hold configuration options for scans.
use clap::Parser;
use serde_derive::Deserialize;
use std::fs;
use std::path::PathBuf;

use crate::address::{parse_subnet, AddressRange};
use crate::scanner::ssh::HostKeyPolicy;

const DEFAULT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_DELAY_MS: u64 = 30;
const CONFIG_FILE_NAME: &str = ".sshscan.toml";

#[derive(Parser, Debug, Clone)]
#[command(
    name = "sshscan",
    version = env!("CARGO_PKG_VERSION"),
    max_term_width = 120,
    help_template = "{bin} {version}\n{about}\n\nUSAGE:\n    {usage}\n\nARGS:\n{positionals}\n\nOPTIONS:\n{options}",
)]
#[allow(clippy::struct_excessive_bools)]
/// Tries one username and password over SSH against every host in a subnet.
/// WARNING: host keys are not verified unless --known-hosts is given, so the
/// password is sent to anything that answers on the port.
///   eg: sshscan 10.1.2.0/24 uname -a
pub struct Opts {
    /// The subnet to scan in CIDR notation, e.g. 10.1.2.0/24.
    #[arg(value_parser = parse_subnet)]
    pub subnet: AddressRange,

    /// Command to run on every host that accepts the credentials.
    /// Words are joined with single spaces.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,

    /// Username to log in with. Prompted for when absent.
    #[arg(short, long)]
    pub username: Option<String>,

    /// Port the SSH service listens on.
    #[arg(short, long, default_value_t = crate::scanner::DEFAULT_PORT)]
    pub port: u16,

    /// The timeout in milliseconds for a whole probe: connect, login and
    /// command. Hosts that take longer are left out.
    #[arg(short, long, default_value_t = DEFAULT_TIMEOUT_MS)]
    pub timeout: u64,

    /// Milliseconds to wait between launching two probes.
    #[arg(short, long, default_value_t = DEFAULT_DELAY_MS)]
    pub delay: u64,

    /// Maximum number of probes in flight. Unbounded when absent, unless the
    /// subnet is larger than the open file limit.
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Automatically ups the ULIMIT with the value you provided.
    #[arg(long)]
    pub ulimit: Option<u64>,

    /// Only log in to hosts whose key is already in ~/.ssh/known_hosts.
    #[arg(long)]
    pub known_hosts: bool,

    /// Greppable mode. Only output the accessible addresses.
    #[arg(short, long)]
    pub greppable: bool,

    /// Accessible mode. Turns off features which negatively affect screen readers.
    #[arg(long)]
    pub accessible: bool,

    /// Whether to ignore the configuration file or not.
    #[arg(short, long)]
    pub no_config: bool,

    /// Hide the banner
    #[arg(long)]
    pub no_banner: bool,

    /// Custom path to config file
    #[arg(short, long, value_parser)]
    pub config_path: Option<PathBuf>,
}

impl Opts {
    pub fn read() -> Self {
        Self::parse()
    }

    /// The trailing command words as one command line.
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }

    pub const fn host_key_policy(&self) -> HostKeyPolicy {
        if self.known_hosts {
            HostKeyPolicy::KnownHosts
        } else {
            HostKeyPolicy::AcceptAny
        }
    }

    /// Merges values found within the user configuration file into the
    /// command line options.
    pub fn merge(&mut self, config: &Config) {
        if !self.no_config {
            self.merge_required(config);
            self.merge_optional(config);
        }
    }

    fn merge_required(&mut self, config: &Config) {
        macro_rules! merge_required {
            ($($field: ident),+) => {
                $(
                    if let Some(e) = &config.$field {
                        self.$field = e.clone();
                    }
                )+
            }
        }

        merge_required!(port, timeout, delay, known_hosts, greppable, accessible);
    }

    fn merge_optional(&mut self, config: &Config) {
        macro_rules! merge_optional {
            ($($field: ident),+) => {
                $(
                    if config.$field.is_some() {
                        self.$field = config.$field.clone();
                    }
                )+
            }
        }

        // A username given on the command line wins over the file.
        if self.username.is_none() {
            self.username = config.username.clone();
        }

        merge_optional!(batch_size, ulimit);
    }
}

/// Struct used to deserialize the options specified within our config file.
/// These will be further merged with our command line arguments in order to
/// generate the final Opts struct. Passwords are never read from it.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    username: Option<String>,
    port: Option<u16>,
    timeout: Option<u64>,
    delay: Option<u64>,
    batch_size: Option<usize>,
    ulimit: Option<u64>,
    known_hosts: Option<bool>,
    greppable: Option<bool>,
    accessible: Option<bool>,
}

impl Config {
    /// Reads the configuration file with TOML format and parses it into a
    /// Config struct. A missing file yields an empty config.
    ///
    /// # Format
    ///
    /// username = "admin"
    /// port = 2222
    /// timeout = 3000
    /// delay = 30
    /// batch_size = 512
    /// known_hosts = true
    ///
    pub fn read(custom_config_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let Some(config_path) = custom_config_path.or_else(default_config_path) else {
            return Ok(Self::default());
        };
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Constructs default path to config toml
pub fn default_config_path() -> Option<PathBuf> {
    let mut config_path = dirs::home_dir()?;
    config_path.push(CONFIG_FILE_NAME);
    Some(config_path)
}
