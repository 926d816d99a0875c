//! Amount and account parsing for the command line

use mine_core::{Address, Amount};
use mine_runtime::{devnet, ChainState};

/// Base units per whole token
pub const TOKEN_UNIT: Amount = mine_auction::TOKEN_UNIT;
const DECIMALS: usize = 8;

/// `123.45` style rendering of base units, trailing zeros dropped
pub fn format_amount(amount: Amount) -> String {
    let whole = amount / TOKEN_UNIT;
    let frac = amount % TOKEN_UNIT;
    if frac == 0 {
        return whole.to_string();
    }
    let digits = format!("{:0width$}", frac, width = DECIMALS);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}

/// Parse a token amount with up to 8 decimals into base units
pub fn parse_amount(text: &str) -> Result<Amount, String> {
    let (whole, frac) = text.split_once('.').unwrap_or((text, ""));
    let is_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && frac.is_empty()) || !is_digits(whole) || !is_digits(frac) {
        return Err(format!("invalid amount: {}", text));
    }
    if frac.len() > DECIMALS {
        return Err(format!("{} has more than {} decimals", text, DECIMALS));
    }

    let whole: Amount = if whole.is_empty() {
        0
    } else {
        whole
            .parse()
            .map_err(|_| format!("amount {} is too large", text))?
    };
    let frac: Amount = if frac.is_empty() {
        0
    } else {
        format!("{:0<width$}", frac, width = DECIMALS)
            .parse()
            .map_err(|_| format!("invalid amount: {}", text))?
    };

    whole
        .checked_mul(TOKEN_UNIT)
        .and_then(|units| units.checked_add(frac))
        .ok_or_else(|| format!("amount {} is too large", text))
}

/// Resolve a well-known name or a hex address.
///
/// Names: `owner`, `alice`, `bob`, `carol`, `mine`, `fee`, `auction`,
/// `vaults`, `miner`, `sink`.
pub fn resolve(name: &str, state: &ChainState) -> Result<Address, String> {
    let address = match name.to_ascii_lowercase().as_str() {
        "owner" => *state.auction.owner(),
        "alice" => devnet::ACCOUNTS[0],
        "bob" => devnet::ACCOUNTS[1],
        "carol" => devnet::ACCOUNTS[2],
        "mine" => state.auction.config().auction_token,
        "fee" => state.auction.config().fee_token,
        "auction" => state.auction.config().engine_account,
        "vaults" => state.vaults.config().engine_account,
        "miner" => *state.auction.mining_recipient(),
        "sink" => state.vaults.config().deduction_recipient,
        _ => return name.parse().map_err(|e| format!("{}: {}", name, e)),
    };
    Ok(address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mine_runtime::ChainConfig;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(0), "0");
        assert_eq!(format_amount(100_000_000_000), "1000");
        assert_eq!(format_amount(99_850_000_000), "998.5");
        assert_eq!(format_amount(1), "0.00000001");
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1000").unwrap(), 100_000_000_000);
        assert_eq!(parse_amount("998.5").unwrap(), 99_850_000_000);
        assert_eq!(parse_amount(".5").unwrap(), 50_000_000);
        assert_eq!(parse_amount("0.00000001").unwrap(), 1);

        assert!(parse_amount("").is_err());
        assert!(parse_amount(".").is_err());
        assert!(parse_amount("-1").is_err());
        assert!(parse_amount("1.+5").is_err());
        assert!(parse_amount("0.000000001").is_err());
        assert!(parse_amount("184467440738").is_err());
    }

    #[test]
    fn test_resolve_names() {
        let (state, _) = ChainState::genesis(&ChainConfig::devnet()).unwrap();

        assert_eq!(resolve("owner", &state).unwrap(), devnet::OWNER);
        assert_eq!(resolve("Bob", &state).unwrap(), devnet::ACCOUNTS[1]);
        assert_eq!(resolve("mine", &state).unwrap(), devnet::MINE_TOKEN);
        assert_eq!(resolve("vaults", &state).unwrap(), devnet::VAULT_ENGINE);
        assert_eq!(
            resolve("0x2222222222222222222222222222222222222222", &state).unwrap(),
            devnet::FEE_TOKEN
        );
        assert!(resolve("nobody", &state).is_err());
    }
}
