use std::{fs, path::Path};

use ethers::signers::LocalWallet;
use eyre::{eyre, Context, Result};

/// Loads one signing key per non-blank line of `path`.
pub fn load_wallets(path: &Path) -> Result<Vec<LocalWallet>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read wallet file {path:?}"))?;
    parse_wallets(&contents)
}

/// Parses newline delimited hex private keys, with or without a `0x` prefix.
///
/// Errors name the 1-based line of the offending key, never the key itself.
pub fn parse_wallets(contents: &str) -> Result<Vec<LocalWallet>> {
    contents
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
        .map(|(line_number, key)| {
            let key = key.strip_prefix("0x").unwrap_or(key);
            key.parse::<LocalWallet>()
                .map_err(|_| eyre!("Invalid private key on line {line_number} of the wallet file"))
        })
        .collect()
}
