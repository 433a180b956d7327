//! The tracked perpetuals universe and venue symbol mapping.

/// Assets tracked by the collector. One CSV file is maintained per entry.
pub const TRACKED_ASSETS: [&str; 93] = [
    "AAVE", "ACH", "ADA", "ALGO", "APE", "APT", "ARB", "AR", "ATOM", "AVAX",
    "AXS", "BAKE", "BCH", "BNB", "BONK", "BTC", "CAKE", "CELO", "CFX", "CHZ",
    "COMP", "CRV", "DOGE", "DOT", "DYDX", "EGLD", "ENA", "ENJ", "ENS", "ETC",
    "ETH", "FET", "FIL", "FLM", "FLOKI", "FTT", "FXS", "GALA", "GMT", "GRT",
    "HBAR", "ICP", "ICX", "IMX", "INJ", "IOTA", "IOTX", "JASMY", "KAVA", "LDO",
    "LINK", "LRC", "LTC", "MASK", "MINA", "MKR", "NEAR", "NEO", "OM", "OP",
    "ORDI", "PAXG", "PENDLE", "PEOPLE", "PEPE", "PYTH", "QNT", "RAD", "RARE",
    "RAY", "ROSE", "RSR", "RUNE", "SAND", "SEI", "SHIB", "SOL", "SUI", "TAO",
    "TIA", "TON", "TRB", "TRX", "UNI", "VET", "WIF", "WLD", "XLM", "XRP",
    "XVG", "YGG", "ZEC", "ZRX",
];

/// Venue listing symbol for an asset.
///
/// Hyperliquid lists some low-unit-price assets in thousands with a
/// `k` prefix (e.g. kPEPE = 1000 PEPE). Everything else maps to itself.
pub fn hyperliquid_symbol(asset: &str) -> &str {
    match asset {
        "PEPE" => "kPEPE",
        "SHIB" => "kSHIB",
        "FLOKI" => "kFLOKI",
        "BONK" => "kBONK",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_k_prefix_mapping() {
        assert_eq!(hyperliquid_symbol("PEPE"), "kPEPE");
        assert_eq!(hyperliquid_symbol("SHIB"), "kSHIB");
        assert_eq!(hyperliquid_symbol("FLOKI"), "kFLOKI");
        assert_eq!(hyperliquid_symbol("BONK"), "kBONK");
    }

    #[test]
    fn test_identity_mapping() {
        assert_eq!(hyperliquid_symbol("BTC"), "BTC");
        assert_eq!(hyperliquid_symbol("ETH"), "ETH");
    }

    #[test]
    fn test_universe_has_no_duplicates() {
        let mut seen = std::collections::HashSet::new();
        for asset in TRACKED_ASSETS {
            assert!(seen.insert(asset), "duplicate asset in universe: {}", asset);
        }
    }
}
