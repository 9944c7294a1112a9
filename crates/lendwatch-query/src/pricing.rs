//! Static token table: symbols, decimals and mock USD prices.
//!
//! Prices are fixed placeholders for display. Unknown tokens get a shortened
//! address as their symbol and no USD value.

use alloy_primitives::U256;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token {
    pub symbol: &'static str,
    /// Lowercase mainnet address.
    pub address: &'static str,
    pub decimals: u8,
    pub usd_price: f64,
}

pub const TOKENS: [Token; 7] = [
    Token { symbol: "USDC", address: "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48", decimals: 6, usd_price: 1.0 },
    Token { symbol: "WETH", address: "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2", decimals: 18, usd_price: 2_500.0 },
    Token { symbol: "USDT", address: "0xdac17f958d2ee523a2206206994597c13d831ec7", decimals: 6, usd_price: 1.0 },
    Token { symbol: "DAI", address: "0x6b175474e89094c44da98b954eedeac495271d0f", decimals: 18, usd_price: 1.0 },
    Token { symbol: "WBTC", address: "0x2260fac5e5542a773aa44fbcfedf7c193bc2c599", decimals: 8, usd_price: 45_000.0 },
    Token { symbol: "AAVE", address: "0x7fc66500c84a76ad7e9c93437bfc5ac33e2ddae9", decimals: 18, usd_price: 150.0 },
    Token { symbol: "LINK", address: "0x514910771af9ca656af840dff83e8264ecf986ca", decimals: 18, usd_price: 15.0 },
];

/// Case-insensitive lookup.
pub fn token_by_address(address: &str) -> Option<&'static Token> {
    TOKENS.iter().find(|t| t.address.eq_ignore_ascii_case(address))
}

/// `0x1234...abcd`. Strings too short to shorten are returned as-is.
pub fn short_address(address: &str) -> String {
    if address.len() <= 10 || !address.is_ascii() {
        return address.to_string();
    }
    format!("{}...{}", &address[..6], &address[address.len() - 4..])
}

pub fn symbol_for(address: &str) -> String {
    match token_by_address(address) {
        Some(t) => t.symbol.to_string(),
        None => short_address(address),
    }
}

/// USD value of `amount` base units of the token at `address`.
pub fn usd_value(amount: U256, address: &str) -> Option<f64> {
    let token = token_by_address(address)?;
    let unit = U256::from(10u64).pow(U256::from(token.decimals));
    let whole = to_f64(amount / unit);
    let frac = to_f64(amount % unit) / 10f64.powi(token.decimals as i32);
    Some((whole + frac) * token.usd_price)
}

fn to_f64(v: U256) -> f64 {
    v.to_string().parse().unwrap_or(f64::MAX)
}

/// `$1.23M`, `$4.56K`, `$7.89`.
pub fn format_usd(value: f64) -> String {
    if !value.is_finite() || value <= 0.0 {
        return "$0.00".into();
    }
    if value >= 1_000_000.0 {
        format!("${:.2}M", value / 1_000_000.0)
    } else if value >= 1_000.0 {
        format!("${:.2}K", value / 1_000.0)
    } else {
        format!("${value:.2}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WETH: &str = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2";
    const USDC: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";

    #[test]
    fn symbols() {
        assert_eq!(symbol_for(WETH), "WETH");
        assert_eq!(
            symbol_for("0x1234567890abcdef1234567890abcdef1234abcd"),
            "0x1234...abcd"
        );
    }

    #[test]
    fn usd_values() {
        let one_eth = U256::from(10u64).pow(U256::from(18u64));
        assert_eq!(usd_value(one_eth, WETH), Some(2_500.0));
        assert_eq!(usd_value(U256::from(1_500_000u64), USDC), Some(1.5));
        assert_eq!(usd_value(U256::from(1u64), "0x0000000000000000000000000000000000000bad"), None);
    }

    #[test]
    fn usd_formatting() {
        assert_eq!(format_usd(2_500_000.0), "$2.50M");
        assert_eq!(format_usd(2_500.0), "$2.50K");
        assert_eq!(format_usd(12.346), "$12.35");
        assert_eq!(format_usd(0.0), "$0.00");
        assert_eq!(format_usd(f64::NAN), "$0.00");
    }
}
