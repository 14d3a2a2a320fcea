//! Instrument Catalog
//!
//! The set of tracked instruments and the store key layout for their records.

use std::fmt;

// =============================================================================
// Types
// =============================================================================

/// A symbol string (equity ticker or crypto trading pair).
pub type Symbol = String;

/// Instrument class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrumentKind {
    /// Equity or ETF traded on the regular session.
    Equity,
    /// Crypto trading pair, trades continuously.
    Crypto,
}

impl InstrumentKind {
    /// Label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Equity => "equity",
            Self::Crypto => "crypto",
        }
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracked instruments, split by class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstrumentCatalog {
    equities: Vec<Symbol>,
    crypto: Vec<Symbol>,
}

impl InstrumentCatalog {
    /// Create a catalog. Symbols are uppercased and de-duplicated, keeping
    /// first-seen order.
    #[must_use]
    pub fn new<E, C>(equities: E, crypto: C) -> Self
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        Self {
            equities: normalize(equities),
            crypto: normalize(crypto),
        }
    }

    /// Tracked equity symbols.
    #[must_use]
    pub fn equities(&self) -> &[Symbol] {
        &self.equities
    }

    /// Tracked crypto pairs.
    #[must_use]
    pub fn crypto(&self) -> &[Symbol] {
        &self.crypto
    }

    /// Whether `symbol` (already uppercased) is a tracked equity.
    #[must_use]
    pub fn is_equity(&self, symbol: &str) -> bool {
        self.equities.iter().any(|s| s == symbol)
    }

    /// Whether `symbol` (already uppercased) is a tracked crypto pair.
    #[must_use]
    pub fn is_crypto(&self, symbol: &str) -> bool {
        self.crypto.iter().any(|s| s == symbol)
    }
}

fn normalize<I>(symbols: I) -> Vec<Symbol>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut out: Vec<Symbol> = Vec::new();
    for symbol in symbols {
        let upper = symbol.as_ref().trim().to_uppercase();
        if !upper.is_empty() && !out.contains(&upper) {
            out.push(upper);
        }
    }
    out
}

/// Short display key for a crypto pair in the all-prices map: the first three
/// characters (`BTCUSDT` -> `BTC`).
#[must_use]
pub fn crypto_short_key(symbol: &str) -> String {
    symbol.chars().take(3).collect()
}

// =============================================================================
// Store Keys
// =============================================================================

/// Key layout of the snapshot store.
pub mod keys {
    /// Singleton market status hash.
    pub const MARKET_STATUS: &str = "market:status";

    /// Live equities quote hash.
    #[must_use]
    pub fn market_current(symbol: &str) -> String {
        format!("market:{symbol}:current")
    }

    /// Final values of the last completed session.
    #[must_use]
    pub fn market_last_close(symbol: &str) -> String {
        format!("market:{symbol}:lastClose")
    }

    /// Raw most-recent venue trade message.
    #[must_use]
    pub fn trades_latest(symbol: &str) -> String {
        format!("trades:{symbol}:latest")
    }

    /// Live crypto quote hash.
    #[must_use]
    pub fn crypto_current(symbol: &str) -> String {
        format!("crypto:{symbol}:current")
    }
}
