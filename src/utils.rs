//! Utility functions for loading local address lists.

use crate::error::ConfigError;

use log::warn;
use std::net::IpAddr;
use std::path::Path;

/// Read a list of local addresses from a file.
pub(crate) fn load_addresses_from_source(source: &str) -> Result<Vec<IpAddr>, ConfigError> {
    let path = Path::new(source);
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Source {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_address_list(&content))
}

/// Parse the text content to extract local IP addresses, one per line.
///
/// Blank lines and lines starting with `#` are ignored. Anything after a `#`
/// on an address line is treated as a comment. IPv6 addresses may be written
/// bare or in brackets.
pub(crate) fn parse_address_list(content: &str) -> Vec<IpAddr> {
    content
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            let line = line.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                return None;
            }
            let candidate = line
                .strip_prefix('[')
                .and_then(|l| l.strip_suffix(']'))
                .unwrap_or(line);
            match candidate.parse::<IpAddr>() {
                Ok(addr) => Some(addr),
                Err(_) => {
                    warn!("Skipping invalid local address on line {}: {}", idx + 1, line);
                    None
                }
            }
        })
        .collect()
}
