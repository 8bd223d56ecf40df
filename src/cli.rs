//! Command-line interface for price-stream.
//!
//! Uses lexopt to keep argument parsing dependency-light.

use std::ffi::OsString;
use std::net::IpAddr;
use std::path::PathBuf;

/// Command-line arguments.
///
/// Every setting is optional so that values left unset on the command line
/// fall through to the environment, the config file and then defaults.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Host address to bind to.
    pub host: Option<IpAddr>,
    /// Port to listen on.
    pub port: Option<u16>,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Default session lifetime in seconds.
    pub session_timeout: Option<u64>,
    /// Expiration sweep period in seconds.
    pub sweep_interval: Option<u64>,
    /// Price update period in milliseconds.
    pub publish_interval_ms: Option<u64>,
    /// Keep-alive ping period in seconds; 0 disables pings.
    pub keep_alive: Option<u64>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('H') | Long("host") => {
                result.host = Some(parse_value(&mut parser, "host")?);
            }
            Short('p') | Long("port") => {
                result.port = Some(parse_value(&mut parser, "port")?);
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('t') | Long("session-timeout") => {
                result.session_timeout = Some(parse_value(&mut parser, "session-timeout")?);
            }
            Short('s') | Long("sweep-interval") => {
                result.sweep_interval = Some(parse_value(&mut parser, "sweep-interval")?);
            }
            Short('i') | Long("publish-interval") => {
                result.publish_interval_ms = Some(parse_value(&mut parser, "publish-interval")?);
            }
            Short('k') | Long("keep-alive") => {
                result.keep_alive = Some(parse_value(&mut parser, "keep-alive")?);
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Value(val) => {
                return Err(ArgsError::UnexpectedArgument(val.to_string_lossy().into()));
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

fn parse_value<T: std::str::FromStr>(
    parser: &mut lexopt::Parser,
    name: &'static str,
) -> Result<T, ArgsError> {
    use lexopt::ValueExt;

    let value: String = parser.value()?.parse()?;
    value
        .parse()
        .map_err(|_| ArgsError::InvalidValue(name, value))
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"price-stream {version}
WebSocket server streaming periodic price updates to every client

USAGE:
    price-stream [OPTIONS]

OPTIONS:
    -H, --host <ADDR>               Host address to bind [default: 127.0.0.1]
    -p, --port <PORT>               Port to listen on [default: 3000]
    -c, --config <FILE>             Path to configuration file (JSON)
    -t, --session-timeout <SECS>    Default session lifetime [default: 60]
    -s, --sweep-interval <SECS>     Expiration sweep period [default: 60]
    -i, --publish-interval <MS>     Price update period [default: 2000]
    -k, --keep-alive <SECS>         Ping period, 0 disables pings [default: 120]
    -l, --log-level <LVL>           Log level (error, warn, info, debug, trace)
    -h, --help                      Print help
    -V, --version                   Print version

ENVIRONMENT VARIABLES:
    PRICE_STREAM_HOST                 Host address (overrides config)
    PRICE_STREAM_PORT                 Port number (overrides config)
    PRICE_STREAM_SESSION_TIMEOUT      Session lifetime in seconds
    PRICE_STREAM_SWEEP_INTERVAL       Sweep period in seconds
    PRICE_STREAM_PUBLISH_INTERVAL_MS  Update period in milliseconds
    PRICE_STREAM_KEEP_ALIVE           Ping period in seconds
    PRICE_STREAM_LOG_LEVEL            Log level (overrides config)
    RUST_LOG                          Alternative log level setting

EXAMPLES:
    # Start with defaults (localhost:3000)
    price-stream

    # Listen on all interfaces with 10 minute sessions
    price-stream -H 0.0.0.0 -p 8080 -t 600

    # Start with config file
    price-stream -c /etc/price-stream/config.json

CLIENTS:
    ws://HOST:PORT/ws                    Stream with the default lifetime
    ws://HOST:PORT/ws?timeout_secs=30    Stream with a 30 second lifetime
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("price-stream {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
    /// Unexpected positional argument.
    UnexpectedArgument(String),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
            Self::UnexpectedArgument(arg) => {
                write!(f, "unexpected argument: '{}'", arg)
            }
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(args: &[&str]) -> Vec<OsString> {
        std::iter::once("price-stream")
            .chain(args.iter().copied())
            .map(OsString::from)
            .collect()
    }

    #[test]
    fn test_default_args() {
        let result = parse_args_from(args(&[])).unwrap();
        assert!(result.host.is_none());
        assert!(result.port.is_none());
        assert!(result.session_timeout.is_none());
        assert!(!result.help);
    }

    #[test]
    fn test_host_port() {
        let result = parse_args_from(args(&["-H", "0.0.0.0", "-p", "8080"])).unwrap();
        assert_eq!(result.host.unwrap().to_string(), "0.0.0.0");
        assert_eq!(result.port, Some(8080));
    }

    #[test]
    fn test_long_options() {
        let result =
            parse_args_from(args(&["--host", "192.168.1.1", "--port", "9000"])).unwrap();
        assert_eq!(result.host.unwrap().to_string(), "192.168.1.1");
        assert_eq!(result.port, Some(9000));
    }

    #[test]
    fn test_timing_options() {
        let result = parse_args_from(args(&["-t", "600", "-s", "5", "-i", "250"])).unwrap();
        assert_eq!(result.session_timeout, Some(600));
        assert_eq!(result.sweep_interval, Some(5));
        assert_eq!(result.publish_interval_ms, Some(250));

        let result = parse_args_from(args(&[
            "--session-timeout",
            "30",
            "--sweep-interval",
            "1",
            "--publish-interval",
            "1000",
        ]))
        .unwrap();
        assert_eq!(result.session_timeout, Some(30));
        assert_eq!(result.sweep_interval, Some(1));
        assert_eq!(result.publish_interval_ms, Some(1000));
    }

    #[test]
    fn test_keep_alive_option() {
        let result = parse_args_from(args(&["-k", "30"])).unwrap();
        assert_eq!(result.keep_alive, Some(30));

        let result = parse_args_from(args(&["--keep-alive", "0"])).unwrap();
        assert_eq!(result.keep_alive, Some(0));
    }

    #[test]
    fn test_config_file() {
        let result = parse_args_from(args(&["-c", "/etc/config.json"])).unwrap();
        assert_eq!(result.config, Some(PathBuf::from("/etc/config.json")));
    }

    #[test]
    fn test_help_flag() {
        let result = parse_args_from(args(&["-h"])).unwrap();
        assert!(result.help);

        let result = parse_args_from(args(&["--help"])).unwrap();
        assert!(result.help);
    }

    #[test]
    fn test_version_flag() {
        let result = parse_args_from(args(&["-V"])).unwrap();
        assert!(result.version);

        let result = parse_args_from(args(&["--version"])).unwrap();
        assert!(result.version);
    }

    #[test]
    fn test_log_level() {
        let result = parse_args_from(args(&["-l", "debug"])).unwrap();
        assert_eq!(result.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_invalid_port() {
        let err = parse_args_from(args(&["-p", "invalid"])).unwrap_err();
        assert_eq!(err.to_string(), "invalid value for --port: 'invalid'");
    }

    #[test]
    fn test_invalid_host() {
        let result = parse_args_from(args(&["-H", "not-an-ip"]));
        assert!(result.is_err());
    }

    #[test]
    fn test_negative_timeout_rejected() {
        let result = parse_args_from(args(&["-t", "-5"]));
        assert!(result.is_err());
    }

    #[test]
    fn test_unexpected_positional() {
        let err = parse_args_from(args(&["serve"])).unwrap_err();
        assert!(matches!(err, ArgsError::UnexpectedArgument(ref a) if a == "serve"));
    }

    #[test]
    fn test_missing_value() {
        let result = parse_args_from(args(&["--port"]));
        assert!(matches!(result, Err(ArgsError::Lexopt(_))));
    }
}
