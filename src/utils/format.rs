use ethers_core::types::U256;
use ethers_core::utils::format_units;

/// wei → gwei 字符串（仅用于日志）
pub fn to_gwei(value: U256) -> String {
    format_units(value, "gwei").unwrap_or_else(|_| value.to_string())
}

/// wei → ether 字符串（仅用于日志）
pub fn to_ether(value: U256) -> String {
    format_units(value, "ether").unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_whole_gwei() {
        assert_eq!(to_gwei(U256::from(31_000_000_000u64)), "31.000000000");
    }

    #[test]
    fn formats_ether() {
        assert_eq!(
            to_ether(U256::from(1_500_000_000_000_000_000u128)),
            "1.500000000000000000"
        );
    }
}
