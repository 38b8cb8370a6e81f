//! Amount parsing and formatting
//!
//! Decimal strings to integer token units and back. Parsing is pure integer
//! math; excess fractional digits are truncated rather than rounded, the
//! same way wallets treat sub-wei precision.

use alloy::primitives::U256;
use anyhow::{bail, Result};

/// Parse a decimal ETH amount ("1.5") into wei.
pub fn parse_eth_to_wei(amount: &str) -> Result<U256> {
    parse_units(amount, 18)
}

/// Parse a decimal amount into integer units with the given decimals.
pub fn parse_units(amount: &str, decimals: u8) -> Result<U256> {
    let amount = amount.trim();
    if amount.is_empty() {
        bail!("could not parse amount");
    }

    let (whole_str, frac_str) = match amount.split_once('.') {
        Some((w, f)) => (w, f),
        None => (amount, ""),
    };

    let whole_str = if whole_str.is_empty() { "0" } else { whole_str };
    if !whole_str.bytes().all(|b| b.is_ascii_digit())
        || !frac_str.bytes().all(|b| b.is_ascii_digit())
    {
        bail!("could not parse amount");
    }

    let scale = U256::from(10u64).pow(U256::from(decimals as u64));
    let whole: U256 = whole_str.parse().map_err(|_| anyhow::anyhow!("could not parse amount"))?;

    // Truncate fractional digits beyond the token's precision.
    let frac_digits: String = frac_str.chars().take(decimals as usize).collect();
    let frac = if frac_digits.is_empty() {
        U256::ZERO
    } else {
        let parsed: U256 = frac_digits
            .parse()
            .map_err(|_| anyhow::anyhow!("could not parse amount"))?;
        parsed * U256::from(10u64).pow(U256::from((decimals as usize - frac_digits.len()) as u64))
    };

    Ok(whole * scale + frac)
}

/// Format wei as an ETH string with six fractional digits.
pub fn wei_to_eth(wei: U256) -> String {
    format_scaled(wei, 18, 6)
}

/// Format wei as a gwei string with two fractional digits.
pub fn wei_to_gwei(wei: U256) -> String {
    format_scaled(wei, 9, 2)
}

fn format_scaled(amount: U256, decimals: u8, shown: usize) -> String {
    let scale = U256::from(10u64).pow(U256::from(decimals as u64));
    let whole = amount / scale;
    let frac = amount % scale;

    let frac_str = format!("{:0>width$}", frac.to_string(), width = decimals as usize);
    format!("{whole}.{}", &frac_str[..shown])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_eth_round_trips_through_format() {
        let wei = parse_eth_to_wei("1.5").unwrap();
        assert_eq!(wei, U256::from(1_500_000_000_000_000_000u64));
        assert_eq!(wei_to_eth(wei), "1.500000");
    }

    #[test]
    fn test_parse_whole_and_fraction_only() {
        assert_eq!(parse_eth_to_wei("2").unwrap(), U256::from(2_000_000_000_000_000_000u64));
        assert_eq!(parse_eth_to_wei(".25").unwrap(), U256::from(250_000_000_000_000_000u64));
        assert_eq!(parse_eth_to_wei("0.000000000000000001").unwrap(), U256::from(1u64));
    }

    #[test]
    fn test_excess_precision_is_truncated() {
        // 19 fractional digits; the last one is dropped.
        assert_eq!(
            parse_eth_to_wei("0.0000000000000000019").unwrap(),
            U256::from(1u64)
        );
    }

    #[test]
    fn test_parse_units_respects_decimals() {
        assert_eq!(parse_units("2500.25", 6).unwrap(), U256::from(2_500_250_000u64));
        assert_eq!(parse_units("1", 0).unwrap(), U256::from(1u64));
    }

    #[test]
    fn test_invalid_amounts_fail() {
        assert!(parse_eth_to_wei("").is_err());
        assert!(parse_eth_to_wei("abc").is_err());
        assert!(parse_eth_to_wei("1.2.3").is_err());
        assert!(parse_eth_to_wei("1,5").is_err());
        assert!(parse_eth_to_wei("-1").is_err());
    }

    #[test]
    fn test_wei_to_gwei() {
        assert_eq!(wei_to_gwei(U256::from(1_500_000_000u64)), "1.50");
        assert_eq!(wei_to_gwei(U256::from(25_000_000_000u64)), "25.00");
    }
}
