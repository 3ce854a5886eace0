//! Server configuration (§10.1): the four knobs named in §6, sourced either from the
//! process arguments or from a TOML file.

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 69;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_TIMEOUT_SECS: u64 = 3;

#[derive(Parser, Debug)]
#[command(name = "tftpd", about = "An in-memory TFTP server")]
struct Args {
    #[arg(long, default_value = DEFAULT_HOST)]
    host: IpAddr,

    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    maxretries: u32,

    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,
}

/// A config file mirrors the same four fields, read as whole seconds like the CLI.
#[derive(Deserialize, Debug, Default)]
struct ConfigFile {
    host: Option<IpAddr>,
    port: Option<u16>,
    maxretries: Option<u32>,
    timeout: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: DEFAULT_HOST.parse().expect("default host is a valid IP literal"),
            port: DEFAULT_PORT,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl Config {
    /// Parses `--host`, `--port`, `--maxretries`, `--timeout` from the process
    /// arguments (§6).
    pub fn from_args() -> Config {
        let args = Args::parse();
        Config {
            host: args.host,
            port: args.port,
            timeout: Duration::from_secs(args.timeout),
            max_retries: args.maxretries,
        }
    }

    /// Reads the same four fields from a TOML file, falling back to the defaults for
    /// any field the file omits.
    pub fn from_toml_file(path: impl AsRef<Path>) -> std::io::Result<Config> {
        let contents = std::fs::read_to_string(path)?;
        let file: ConfigFile = toml::from_str(&contents)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
        let defaults = Config::default();
        Ok(Config {
            host: file.host.unwrap_or(defaults.host),
            port: file.port.unwrap_or(defaults.port),
            timeout: file.timeout.map(Duration::from_secs).unwrap_or(defaults.timeout),
            max_retries: file.maxretries.unwrap_or(defaults.max_retries),
        })
    }
}
