//! Command line surface
//!
//! Turns the command line into a `Config`. All target sources are resolved into a plain list of
//! identifiers here, the engine never touches files or standard input.

use std::error::Error;
use std::ffi::OsString;
use std::fmt;
use std::time::Duration;

use crate::logger::StdLogger;
use crate::target;
use crate::{Config, Display};

/// A command line that parses, but cannot be run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    ConflictingDisplay,
    MissingRange,
    NoTargets,
    ZeroCount,
}

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConflictingDisplay => write!(f, "cannot use both -a and -u options simultaneously"),
            Self::MissingRange => write!(f, "-g requires either CIDR notation or start/end IP addresses"),
            Self::NoTargets => write!(f, "no targets specified"),
            Self::ZeroCount => write!(f, "count must be at least 1"),
        }
    }
}

impl Error for UsageError {}

/// Application initialization
pub struct App;

impl App {
    /// Retrieve user input from command line
    ///
    /// The user can modify the following parameters of the application:
    /// - targets: host names or addresses (or a range/CIDR block with `-g`)
    /// - count: number of probes per target (default 1)
    /// - timeout: the timeout per probe (default 500ms)
    /// - interval: the pause between probes to the same target (default 1,000ms)
    /// - period: the pause between starting consecutive targets (default 25ms)
    /// - bytes: the payload size per packet (default 56 bytes)
    pub fn parse_args() -> Result<Config, Box<dyn Error>> {
        Self::parse_from(std::env::args_os())
    }

    /// Parse an explicit argument list, the first item being the program name
    pub fn parse_from<I, T>(args: I) -> Result<Config, Box<dyn Error>>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        // Define CLI interface here
        let app = clap_app!(fanping =>
            (version: crate_version!())
            (about: "Send pings to many hosts at once")
            (@arg targets: ... "Host names or addresses to ping")
            (@arg count: -c --count +takes_value "Number of pings to send to each target (default 1)")
            (@arg timeout: -t --timeout +takes_value "Timeout per ping in ms (default 500)")
            (@arg interval: -i --interval +takes_value "Interval between pings to the same target in ms (default 1000)")
            (@arg period: -p --period +takes_value "Period between pings to consecutive targets in ms (default 25)")
            (@arg bytes: -b --bytes +takes_value "Payload size per packet in bytes (default 56)")
            (@arg alive: -a --alive "Show only alive hosts")
            (@arg unreachable: -u --unreachable "Show only unreachable hosts")
            (@arg quiet: -q --quiet "Quiet mode - only show the summary")
            (@arg stats: -s --stats "Show summary statistics")
            (@arg file: -f --file +takes_value "Read targets from a file")
            (@arg generate: -g --generate "Generate targets from an IP range or CIDR block")
            (@arg verbose: -v --verbose "Sets the level of verbosity"));

        let matches = app.get_matches_from_safe(args)?;

        let verbose = matches.is_present("verbose");
        StdLogger::init(verbose);

        let alive = matches.is_present("alive");
        let unreachable = matches.is_present("unreachable");
        let display = match (alive, unreachable) {
            (true, true) => return Err(UsageError::ConflictingDisplay.into()),
            (true, false) => Display::AliveOnly,
            (false, true) => Display::UnreachableOnly,
            (false, false) => Display::All,
        };

        let count = matches.value_of("count").unwrap_or("1").parse::<usize>()?;
        if count == 0 {
            return Err(UsageError::ZeroCount.into());
        }

        let timeout = millis(matches.value_of("timeout"), 500)?;
        let interval = millis(matches.value_of("interval"), 1000)?;
        let period = millis(matches.value_of("period"), 25)?;

        let payload_size = matches.value_of("bytes").unwrap_or("56").parse::<usize>()?;
        if payload_size > 1472 {
            warn!("Beware of the Maximum Transmission Unit supported by your network device");
            warn!("If you do not receive any responses, try a smaller packet size");
        }

        let positional: Vec<String> = matches
            .values_of("targets")
            .map(|values| values.map(String::from).collect())
            .unwrap_or_default();

        // Sources in order of precedence: range, file, arguments, piped standard input
        let targets = if matches.is_present("generate") {
            if positional.is_empty() {
                return Err(UsageError::MissingRange.into());
            }
            target::generate(&positional)?
        } else if let Some(path) = matches.value_of("file") {
            target::from_file(path)?
        } else if !positional.is_empty() {
            positional
        } else {
            target::from_stdin()?
        };

        if targets.is_empty() {
            return Err(UsageError::NoTargets.into());
        }

        trace!("Parsed configuration with {} targets", targets.len());

        Ok(Config {
            targets,
            count,
            timeout,
            interval,
            period,
            display,
            quiet: matches.is_present("quiet"),
            show_stats: matches.is_present("stats"),
            payload_size,
            ..Config::default()
        })
    }
}

fn millis(value: Option<&str>, default: u64) -> Result<Duration, Box<dyn Error>> {
    let ms = match value {
        Some(val) => val.parse::<u64>()?,
        None => default,
    };
    Ok(Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Config, Box<dyn Error>> {
        App::parse_from(std::iter::once("fanping").chain(args.iter().copied()))
    }

    fn usage_error(args: &[&str]) -> UsageError {
        let err = parse(args).expect_err("Arguments should not parse");
        err.downcast_ref::<UsageError>()
            .cloned()
            .expect("Not a usage error")
    }

    #[test]
    fn default_config() {
        let config = parse(&["127.0.0.1"]).unwrap();
        assert_eq!(config.targets, vec!["127.0.0.1"]);
        assert_eq!(config.count, 1);
        assert_eq!(config.timeout, Duration::from_millis(500));
        assert_eq!(config.interval, Duration::from_millis(1000));
        assert_eq!(config.period, Duration::from_millis(25));
        assert_eq!(config.display, Display::All);
        assert_eq!(config.payload_size, 56);
        assert!(!config.quiet);
        assert!(!config.show_stats);
    }

    #[test]
    fn custom_config() {
        let config = parse(&[
            "-c", "5", "-t", "200", "-i", "0", "-p", "10", "-q", "-s", "-a", "host.example", "10.0.0.1",
        ])
        .unwrap();

        assert_eq!(config.targets, vec!["host.example", "10.0.0.1"]);
        assert_eq!(config.count, 5);
        assert_eq!(config.timeout, Duration::from_millis(200));
        assert_eq!(config.interval, Duration::from_millis(0));
        assert_eq!(config.period, Duration::from_millis(10));
        assert_eq!(config.display, Display::AliveOnly);
        assert!(config.quiet);
        assert!(config.show_stats);
        assert!(config.wants_summary());
    }

    #[test]
    fn alive_and_unreachable_conflict() {
        assert_eq!(usage_error(&["-a", "-u", "127.0.0.1"]), UsageError::ConflictingDisplay);
    }

    #[test]
    fn zero_count_is_rejected() {
        assert_eq!(usage_error(&["-c", "0", "127.0.0.1"]), UsageError::ZeroCount);
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        assert!(parse(&["-c", "many", "127.0.0.1"]).is_err());
        assert!(parse(&["-t", "-5", "127.0.0.1"]).is_err());
    }

    #[test]
    fn generate_from_cidr() {
        let config = parse(&["-g", "192.168.1.0/30"]).unwrap();
        assert_eq!(config.targets, vec!["192.168.1.1", "192.168.1.2"]);
    }

    #[test]
    fn generate_from_range() {
        let config = parse(&["-g", "10.0.0.1", "10.0.0.3"]).unwrap();
        assert_eq!(config.targets, vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
    }

    #[test]
    fn generate_errors() {
        assert_eq!(usage_error(&["-g"]), UsageError::MissingRange);
        assert!(parse(&["-g", "10.0.0.9", "10.0.0.1"]).is_err());
        assert!(parse(&["-g", "not-a-block/99"]).is_err());
    }

    #[test]
    fn targets_from_file() {
        use std::io::Write;

        let path = std::env::temp_dir().join(format!("fanping-cli-{}.txt", std::process::id()));
        {
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(file, "# lab\n10.1.1.1\n\n10.1.1.2").unwrap();
        }

        let config = parse(&["-f", path.to_str().unwrap(), "ignored.example"]);
        let _ = std::fs::remove_file(&path);

        assert_eq!(config.unwrap().targets, vec!["10.1.1.1", "10.1.1.2"]);
    }
}
