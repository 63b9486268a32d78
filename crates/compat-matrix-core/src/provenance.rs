//! Provenance parsing: recover the (client, server) version pair from a
//! snapshot or status file name such as `client3.6_server3.8_metrics.txt`.

use crate::config::MatrixConfig;
use crate::domain::{CombinationKey, MatrixError, Result};

/// Extensions stripped from a bare provenance name before tokenising.
const TRAILING_EXTENSIONS: [&str; 2] = [".txt", ".prom"];

/// Parse a provenance string into a [`CombinationKey`].
///
/// The name is split on `_`; the first part starting with one of the
/// configured client prefixes yields the client token and the first other
/// part starting with the server prefix yields the server token. Both tokens
/// are kept verbatim. Anything else in the name is ignored.
pub fn parse_provenance(name: &str, config: &MatrixConfig) -> Result<CombinationKey> {
    let base = strip_known_suffix(name, config);
    let parts: Vec<&str> = base.split('_').collect();

    let client = parts.iter().enumerate().find_map(|(idx, part)| {
        config
            .client_prefixes
            .iter()
            .filter(|prefix| !prefix.is_empty())
            .find_map(|prefix| part.strip_prefix(prefix.as_str()))
            .filter(|token| !token.is_empty())
            .map(|token| (idx, token))
    });

    let Some((client_idx, client_token)) = client else {
        return Err(MatrixError::UnparseableProvenance(name.to_string()));
    };

    let server_token = parts
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != client_idx)
        .find_map(|(_, part)| part.strip_prefix(config.server_prefix.as_str()))
        .filter(|token| !token.is_empty());

    match server_token {
        Some(server_token) => Ok(CombinationKey::new(client_token, server_token)),
        None => Err(MatrixError::UnparseableProvenance(name.to_string())),
    }
}

/// Canonical provenance stem for a key, e.g. `client3.6_server3.8`.
pub fn provenance_stem(key: &CombinationKey, config: &MatrixConfig) -> String {
    let client_prefix = config
        .client_prefixes
        .iter()
        .find(|p| !p.is_empty())
        .map(String::as_str)
        .unwrap_or("client");
    format!(
        "{}{}_{}{}",
        client_prefix, key.client_version, config.server_prefix, key.server_version
    )
}

fn strip_known_suffix<'a>(name: &'a str, config: &MatrixConfig) -> &'a str {
    if let Some(base) = name.strip_suffix(config.snapshot_suffix.as_str()) {
        return base;
    }
    if let Some(base) = name.strip_suffix(config.status_suffix.as_str()) {
        return base;
    }
    TRAILING_EXTENSIONS
        .iter()
        .find_map(|ext| name.strip_suffix(ext))
        .unwrap_or(name)
}
