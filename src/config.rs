//! Startup configuration: a single positional port argument.
//!
//! Command-line parsing is treated as a thin shell around the server core;
//! the only contract the core relies on is "give me a valid TCP port or
//! fail the process with a non-zero exit code".

use clap::Parser;

/// Command-line arguments for the chat relay server.
#[derive(Parser, Debug)]
#[command(name = "chatrelay")]
#[command(author = "chatrelay authors")]
#[command(version = "0.1.0")]
#[command(about = "A line-oriented chat relay server", long_about = None)]
pub struct CliArgs {
    /// TCP port to listen on (1-65535)
    #[arg(value_parser = parse_port)]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Final resolved configuration.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub port: u16,
}

impl Config {
    /// Load configuration from command-line arguments.
    ///
    /// `clap` exits the process with a usage diagnostic on any misuse:
    /// missing argument, non-numeric, zero, or out-of-range all fail with
    /// a non-zero exit code before this function returns.
    pub fn load() -> (Self, String) {
        let cli = CliArgs::parse();
        (Config { port: cli.port }, cli.log_level)
    }
}

/// Validate and parse a port argument, rejecting 0 (clap's `u16` parsing
/// already rejects anything outside 0..=65535 and non-numeric input).
fn parse_port(s: &str) -> Result<u16, String> {
    let port: u16 = s
        .parse()
        .map_err(|_| "port must be between 1 and 65535".to_string())?;
    if port == 0 {
        return Err("port must be between 1 and 65535".to_string());
    }
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_port_valid() {
        assert_eq!(parse_port("8080"), Ok(8080));
        assert_eq!(parse_port("1"), Ok(1));
        assert_eq!(parse_port("65535"), Ok(65535));
    }

    #[test]
    fn test_parse_port_rejects_zero() {
        assert!(parse_port("0").is_err());
    }

    #[test]
    fn test_parse_port_rejects_out_of_range() {
        assert!(parse_port("65536").is_err());
    }

    #[test]
    fn test_parse_port_rejects_non_numeric() {
        assert!(parse_port("abc").is_err());
    }
}
