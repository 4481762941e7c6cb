//! Target acquisition
//!
//! Targets are plain identifiers, either host names or literal addresses. They are produced here
//! in the order the user provided them and are neither validated nor de-duplicated; that is left
//! to the resolver.

use ipnet::{Ipv4AddrRange, Ipv4Net};
use std::fs::File;
use std::io::{self, BufRead, BufReader, IsTerminal};
use std::net::Ipv4Addr;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("invalid IPv4 address: {0}")]
    InvalidAddress(String),

    #[error("start address {start} is greater than end address {end}")]
    ReversedRange { start: Ipv4Addr, end: Ipv4Addr },

    #[error("invalid CIDR block {0}")]
    InvalidCidr(String),

    #[error("could not read targets: {0}")]
    Io(#[from] io::Error),
}

/// Read targets line by line
///
/// Surrounding whitespace is trimmed. Blank lines and lines starting with `#` are skipped.
pub fn read_lines<R: BufRead>(reader: R) -> Result<Vec<String>, TargetError> {
    let mut targets = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        targets.push(line.to_string());
    }
    Ok(targets)
}

/// Read targets from a file, one per line
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Vec<String>, TargetError> {
    let file = File::open(path)?;
    read_lines(BufReader::new(file))
}

/// Read targets from standard input, one per line
///
/// Standard input is only consumed if it has been redirected or piped. An interactive terminal
/// yields no targets instead of blocking on user input.
pub fn from_stdin() -> Result<Vec<String>, TargetError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        trace!("Standard input is a terminal, not reading targets from it");
        return Ok(Vec::new());
    }
    read_lines(stdin.lock())
}

/// Every address from `start` to `end`, both inclusive, in numeric order
pub fn from_range(start: &str, end: &str) -> Result<Vec<String>, TargetError> {
    let start = parse_ipv4(start)?;
    let end = parse_ipv4(end)?;

    // Octets are compared in network byte order
    if u32::from(start) > u32::from(end) {
        return Err(TargetError::ReversedRange { start, end });
    }

    Ok(Ipv4AddrRange::new(start, end)
        .map(|addr| addr.to_string())
        .collect())
}

/// Every host address of a CIDR block in numeric order
///
/// Blocks with a prefix shorter than 31 bits exclude their network and broadcast addresses. `/31`
/// and `/32` blocks yield all of their addresses.
pub fn from_cidr(cidr: &str) -> Result<Vec<String>, TargetError> {
    let net = cidr
        .trim()
        .parse::<Ipv4Net>()
        .map_err(|_| TargetError::InvalidCidr(cidr.to_string()))?;

    Ok(net.hosts().map(|addr| addr.to_string()).collect())
}

/// Expand a range argument into targets
///
/// A first argument containing a `/` is read as CIDR block and any further arguments are ignored.
/// Otherwise two arguments are read as start and end address of a range.
pub fn generate(args: &[String]) -> Result<Vec<String>, TargetError> {
    match args {
        [cidr, ..] if cidr.contains('/') => from_cidr(cidr),
        [start, end, ..] => from_range(start, end),
        [single] => Err(TargetError::InvalidCidr(single.clone())),
        [] => Err(TargetError::InvalidCidr(String::new())),
    }
}

fn parse_ipv4(addr: &str) -> Result<Ipv4Addr, TargetError> {
    addr.trim()
        .parse::<Ipv4Addr>()
        .map_err(|_| TargetError::InvalidAddress(addr.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn lines(input: &str) -> Vec<String> {
        read_lines(Cursor::new(input)).expect("Failed reading lines")
    }

    #[test]
    fn read_lines_from_string() {
        assert!(lines("").is_empty());
        assert_eq!(lines("192.168.1.1"), vec!["192.168.1.1"]);
        assert_eq!(
            lines("192.168.1.1\n192.168.1.2\n192.168.1.3"),
            vec!["192.168.1.1", "192.168.1.2", "192.168.1.3"]
        );
    }

    #[test]
    fn read_lines_trims_and_skips() {
        let input = "  192.168.1.1  \n\t192.168.1.2\n\n   \n# a comment\n   # indented comment\nexample.com\n";
        assert_eq!(
            lines(input),
            vec!["192.168.1.1", "192.168.1.2", "example.com"]
        );
    }

    #[test]
    fn read_lines_keeps_duplicates() {
        assert_eq!(lines("a\na\n"), vec!["a", "a"]);
    }

    #[test]
    fn read_targets_from_file() {
        use std::io::Write;

        let path = std::env::temp_dir().join(format!("fanping-targets-{}.txt", std::process::id()));
        {
            let mut file = File::create(&path).expect("Failed creating target file");
            writeln!(file, "# hosts\n10.0.0.1\n\n  10.0.0.2  ").expect("Failed writing target file");
        }

        let targets = from_file(&path);
        let _ = std::fs::remove_file(&path);

        assert_eq!(targets.expect("Failed reading target file"), vec!["10.0.0.1", "10.0.0.2"]);
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = from_file("/nonexistent/fanping/targets.txt");
        assert!(matches!(result, Err(TargetError::Io(_))));
    }

    #[test]
    fn generate_from_range() {
        assert_eq!(
            from_range("192.168.1.1", "192.168.1.3").unwrap(),
            vec!["192.168.1.1", "192.168.1.2", "192.168.1.3"]
        );
        assert_eq!(from_range("10.0.0.7", "10.0.0.7").unwrap(), vec!["10.0.0.7"]);
    }

    #[test]
    fn generate_from_range_across_octets() {
        let range = from_range("10.0.0.254", "10.0.1.1").unwrap();
        assert_eq!(range, vec!["10.0.0.254", "10.0.0.255", "10.0.1.0", "10.0.1.1"]);
    }

    #[test]
    fn generate_from_invalid_range() {
        assert!(matches!(
            from_range("invalid", "192.168.1.3"),
            Err(TargetError::InvalidAddress(_))
        ));
        assert!(matches!(
            from_range("192.168.1.1", "invalid"),
            Err(TargetError::InvalidAddress(_))
        ));
        assert!(matches!(
            from_range("192.168.1.10", "192.168.1.1"),
            Err(TargetError::ReversedRange { .. })
        ));
        assert!(matches!(
            from_range("::1", "::2"),
            Err(TargetError::InvalidAddress(_))
        ));
    }

    #[test]
    fn generate_from_cidr() {
        assert_eq!(
            from_cidr("192.168.1.0/30").unwrap(),
            vec!["192.168.1.1", "192.168.1.2"]
        );

        let block = from_cidr("192.168.1.0/24").unwrap();
        assert_eq!(block.len(), 254);
        assert_eq!(block.first().map(String::as_str), Some("192.168.1.1"));
        assert_eq!(block.last().map(String::as_str), Some("192.168.1.254"));
    }

    #[test]
    fn generate_from_small_cidr() {
        assert_eq!(from_cidr("10.0.0.4/31").unwrap(), vec!["10.0.0.4", "10.0.0.5"]);
        assert_eq!(from_cidr("10.0.0.9/32").unwrap(), vec!["10.0.0.9"]);
    }

    #[test]
    fn generate_from_invalid_cidr() {
        assert!(matches!(from_cidr("invalid"), Err(TargetError::InvalidCidr(_))));
        assert!(matches!(from_cidr("10.0.0.0/33"), Err(TargetError::InvalidCidr(_))));
    }

    #[test]
    fn generate_dispatches_on_argument_shape() {
        let cidr = vec!["10.0.0.0/30".to_string()];
        assert_eq!(generate(&cidr).unwrap(), vec!["10.0.0.1", "10.0.0.2"]);

        let range = vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()];
        assert_eq!(generate(&range).unwrap(), vec!["10.0.0.1", "10.0.0.2"]);

        assert!(generate(&["10.0.0.1".to_string()]).is_err());
        assert!(generate(&[]).is_err());
    }

    #[test]
    fn generate_cidr_ignores_trailing_arguments() {
        let args = vec!["10.0.0.0/30".to_string(), "extra".to_string()];
        assert_eq!(generate(&args).unwrap(), vec!["10.0.0.1", "10.0.0.2"]);
    }
}
