//! Quote Snapshots
//!
//! Normalized price records for equities and crypto, their field-map layout
//! in the snapshot store, and the trade-to-quote derivation used by both the
//! equities adapter and the supervisor's reconciliation pass.
//!
//! Numeric fields are stored as the shortest decimal string that parses back
//! to the identical `f64`, so a write followed by a read is lossless.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::calendar::{MarketStatus, StatusMessage, exchange_date};

/// Field map of a single hash record.
pub type Fields = HashMap<String, String>;

// =============================================================================
// Field Encoding
// =============================================================================

/// Format a float for storage (exact round trip).
#[must_use]
pub fn format_f64(value: f64) -> String {
    value.to_string()
}

/// Format an instant as ISO-8601 UTC with millisecond precision.
#[must_use]
pub fn format_instant(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored ISO-8601 instant.
#[must_use]
pub fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn field_f64(fields: &Fields, name: &str) -> Option<f64> {
    fields.get(name).and_then(|v| v.trim().parse::<f64>().ok())
}

fn field_i64(fields: &Fields, name: &str) -> Option<i64> {
    fields.get(name).and_then(|v| v.trim().parse::<i64>().ok())
}

fn field_instant(fields: &Fields, name: &str) -> Option<DateTime<Utc>> {
    fields.get(name).and_then(|v| parse_instant(v))
}

/// Serde adapter for millisecond-precision ISO-8601 timestamps.
pub mod iso_millis {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_instant(*value))
    }

    /// Deserialize from any RFC 3339 timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not RFC 3339.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_instant(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
    }
}

// =============================================================================
// Equities
// =============================================================================

/// A single venue trade print: last price and venue trade time (ms).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradePrint {
    /// Trade price.
    #[serde(rename = "p")]
    pub price: f64,
    /// Venue trade time, Unix milliseconds.
    #[serde(rename = "t")]
    pub timestamp: i64,
}

/// Live equities quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentQuote {
    /// Uppercase ticker.
    pub symbol: String,
    /// Last trade price.
    pub current_price: f64,
    /// `current_price - previous_close`.
    pub change: f64,
    /// Change as a percentage of the previous close.
    pub percent_change: f64,
    /// Session high.
    pub day_high: f64,
    /// Session low.
    pub day_low: f64,
    /// Baseline for change calculations, fixed for the session.
    pub previous_close: f64,
    /// Venue trade time of the last print (ms).
    #[serde(rename = "timestamp")]
    pub trade_timestamp: i64,
    /// When this record was written.
    #[serde(with = "iso_millis")]
    pub last_update: DateTime<Utc>,
}

impl InstrumentQuote {
    /// Derive the next quote from a trade print and the stored record.
    ///
    /// - A fresh record seeds `previous_close` from its own first print.
    /// - A record last written on an earlier exchange date starts a new
    ///   session: the stored `current_price` becomes `previous_close` and the
    ///   day range resets to the print.
    /// - Otherwise the stored baseline is kept and the day range widens to
    ///   include the print.
    #[must_use]
    pub fn from_trade(
        symbol: &str,
        previous: &Fields,
        trade: TradePrint,
        now: DateTime<Utc>,
    ) -> Self {
        let price = trade.price;

        let new_session = field_instant(previous, "lastUpdate")
            .is_some_and(|last| exchange_date(last) < exchange_date(now));

        let (previous_close, day_high, day_low) = if new_session {
            let baseline = field_f64(previous, "currentPrice")
                .or_else(|| field_f64(previous, "previousClose"))
                .unwrap_or(price);
            (baseline, price, price)
        } else {
            (
                field_f64(previous, "previousClose").unwrap_or(price),
                field_f64(previous, "dayHigh").map_or(price, |high| high.max(price)),
                field_f64(previous, "dayLow").map_or(price, |low| low.min(price)),
            )
        };

        let change = price - previous_close;
        let percent_change = if previous_close == 0.0 {
            0.0
        } else {
            change / previous_close * 100.0
        };

        Self {
            symbol: symbol.to_string(),
            current_price: price,
            change,
            percent_change,
            day_high,
            day_low,
            previous_close,
            trade_timestamp: trade.timestamp,
            last_update: now,
        }
    }

    /// Read a stored record. Missing numeric fields read as zero and a
    /// missing `lastUpdate` reads as `now`.
    #[must_use]
    pub fn from_fields(symbol: &str, fields: &Fields, now: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.to_string(),
            current_price: field_f64(fields, "currentPrice").unwrap_or(0.0),
            change: field_f64(fields, "change").unwrap_or(0.0),
            percent_change: field_f64(fields, "percentChange").unwrap_or(0.0),
            day_high: field_f64(fields, "dayHigh").unwrap_or(0.0),
            day_low: field_f64(fields, "dayLow").unwrap_or(0.0),
            previous_close: field_f64(fields, "previousClose").unwrap_or(0.0),
            trade_timestamp: field_i64(fields, "timestamp").unwrap_or(0),
            last_update: field_instant(fields, "lastUpdate").unwrap_or(now),
        }
    }

    /// Store layout.
    #[must_use]
    pub fn to_fields(&self) -> Fields {
        HashMap::from([
            ("symbol".to_string(), self.symbol.clone()),
            ("currentPrice".to_string(), format_f64(self.current_price)),
            ("change".to_string(), format_f64(self.change)),
            ("percentChange".to_string(), format_f64(self.percent_change)),
            ("dayHigh".to_string(), format_f64(self.day_high)),
            ("dayLow".to_string(), format_f64(self.day_low)),
            ("previousClose".to_string(), format_f64(self.previous_close)),
            ("timestamp".to_string(), self.trade_timestamp.to_string()),
            ("lastUpdate".to_string(), format_instant(self.last_update)),
        ])
    }
}

/// Stored `lastUpdate` of a record, if present and parseable.
#[must_use]
pub fn last_update_of(fields: &Fields) -> Option<DateTime<Utc>> {
    field_instant(fields, "lastUpdate")
}

/// Stored `currentPrice` of a record, if present and parseable.
#[must_use]
pub fn current_price_of(fields: &Fields) -> Option<f64> {
    field_f64(fields, "currentPrice")
}

/// Final values of a completed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastClose {
    /// Final trade price of the session.
    pub close_price: f64,
    /// Session high.
    pub day_high: f64,
    /// Session low.
    pub day_low: f64,
    /// When the session was frozen.
    #[serde(with = "iso_millis")]
    pub close_date: DateTime<Utc>,
}

impl LastClose {
    /// Freeze a live record. Returns `None` if the record has no price.
    #[must_use]
    pub fn from_current(current: &Fields, now: DateTime<Utc>) -> Option<Self> {
        let close_price = field_f64(current, "currentPrice")?;
        Some(Self {
            close_price,
            day_high: field_f64(current, "dayHigh").unwrap_or(close_price),
            day_low: field_f64(current, "dayLow").unwrap_or(close_price),
            close_date: now,
        })
    }

    /// Store layout.
    #[must_use]
    pub fn to_fields(&self) -> Fields {
        HashMap::from([
            ("closePrice".to_string(), format_f64(self.close_price)),
            ("dayHigh".to_string(), format_f64(self.day_high)),
            ("dayLow".to_string(), format_f64(self.day_low)),
            ("closeDate".to_string(), format_instant(self.close_date)),
        ])
    }

    /// Read a stored record. Returns `None` if `closePrice` is missing.
    #[must_use]
    pub fn from_fields(fields: &Fields) -> Option<Self> {
        Some(Self {
            close_price: field_f64(fields, "closePrice")?,
            day_high: field_f64(fields, "dayHigh")?,
            day_low: field_f64(fields, "dayLow")?,
            close_date: field_instant(fields, "closeDate")?,
        })
    }
}

// =============================================================================
// Crypto
// =============================================================================

/// Live crypto quote. Window statistics come straight from the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CryptoQuote {
    /// Trading pair, e.g. `BTCUSDT`.
    pub symbol: String,
    /// Last price.
    pub current_price: f64,
    /// Absolute 24h change.
    pub change_24h: f64,
    /// Percentage 24h change.
    pub percent_change_24h: f64,
    /// 24h high.
    pub high_24h: f64,
    /// 24h low.
    pub low_24h: f64,
    /// 24h base-asset volume.
    pub volume_24h: f64,
    /// When this record was written.
    #[serde(with = "iso_millis")]
    pub last_update: DateTime<Utc>,
}

impl CryptoQuote {
    /// Read a stored record with the same lenient defaults as equities.
    #[must_use]
    pub fn from_fields(symbol: &str, fields: &Fields, now: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.to_string(),
            current_price: field_f64(fields, "currentPrice").unwrap_or(0.0),
            change_24h: field_f64(fields, "change24h").unwrap_or(0.0),
            percent_change_24h: field_f64(fields, "percentChange24h").unwrap_or(0.0),
            high_24h: field_f64(fields, "high24h").unwrap_or(0.0),
            low_24h: field_f64(fields, "low24h").unwrap_or(0.0),
            volume_24h: field_f64(fields, "volume24h").unwrap_or(0.0),
            last_update: field_instant(fields, "lastUpdate").unwrap_or(now),
        }
    }

    /// Store layout.
    #[must_use]
    pub fn to_fields(&self) -> Fields {
        HashMap::from([
            ("symbol".to_string(), self.symbol.clone()),
            ("currentPrice".to_string(), format_f64(self.current_price)),
            ("change24h".to_string(), format_f64(self.change_24h)),
            (
                "percentChange24h".to_string(),
                format_f64(self.percent_change_24h),
            ),
            ("high24h".to_string(), format_f64(self.high_24h)),
            ("low24h".to_string(), format_f64(self.low_24h)),
            ("volume24h".to_string(), format_f64(self.volume_24h)),
            ("lastUpdate".to_string(), format_instant(self.last_update)),
        ])
    }
}

// =============================================================================
// Market Status Record
// =============================================================================

/// Store layout of the market status singleton.
#[must_use]
pub fn status_to_fields(status: &MarketStatus, checked_at: DateTime<Utc>) -> Fields {
    HashMap::from([
        ("isOpen".to_string(), status.is_open.to_string()),
        (
            "statusMessage".to_string(),
            status.status_message.as_str().to_string(),
        ),
        ("reason".to_string(), status.reason.clone()),
        ("lastChecked".to_string(), format_instant(checked_at)),
    ])
}

/// Read the market status singleton. Returns `None` for an empty record.
#[must_use]
pub fn status_from_fields(fields: &Fields) -> Option<MarketStatus> {
    let is_open = fields.get("isOpen")?.trim().eq_ignore_ascii_case("true");
    let status_message = fields
        .get("statusMessage")
        .map_or(StatusMessage::Closed, |s| {
            StatusMessage::from_str_case_insensitive(s)
        });
    Some(MarketStatus {
        is_open,
        status_message,
        reason: fields.get("reason").cloned().unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use proptest::prelude::*;

    use super::*;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        // 2025-03-12 is a Wednesday; 14:00-20:00 UTC is inside the NY session.
        Utc.with_ymd_and_hms(2025, 3, 12, h, m, 0).unwrap()
    }

    fn print(price: f64, timestamp: i64) -> TradePrint {
        TradePrint { price, timestamp }
    }

    #[test]
    fn first_trade_seeds_its_own_baseline() {
        let quote = InstrumentQuote::from_trade("AAPL", &Fields::new(), print(150.0, 1000), at(15, 0));

        assert_eq!(quote.previous_close, 150.0);
        assert_eq!(quote.change, 0.0);
        assert_eq!(quote.percent_change, 0.0);
        assert_eq!(quote.day_high, 150.0);
        assert_eq!(quote.day_low, 150.0);
        assert_eq!(quote.trade_timestamp, 1000);
    }

    #[test]
    fn second_trade_moves_change_and_range() {
        let first = InstrumentQuote::from_trade("AAPL", &Fields::new(), print(150.0, 1000), at(15, 0));
        let second =
            InstrumentQuote::from_trade("AAPL", &first.to_fields(), print(152.0, 2000), at(15, 1));

        assert_eq!(second.previous_close, 150.0);
        assert!((second.change - 2.0).abs() < 1e-9);
        assert!((second.percent_change - 1.333_333).abs() < 1e-4);
        assert_eq!(second.day_high, 152.0);
        assert_eq!(second.day_low, 150.0);
        assert_eq!(second.trade_timestamp, 2000);
    }

    #[test]
    fn new_session_rolls_previous_close() {
        let yesterday = Utc.with_ymd_and_hms(2025, 3, 11, 19, 59, 0).unwrap();
        let mut stored =
            InstrumentQuote::from_trade("MSFT", &Fields::new(), print(400.0, 1), yesterday);
        stored.day_high = 410.0;
        stored.day_low = 395.0;
        stored.current_price = 405.0;

        let today = InstrumentQuote::from_trade("MSFT", &stored.to_fields(), print(401.0, 2), at(14, 31));

        assert_eq!(today.previous_close, 405.0);
        assert_eq!(today.day_high, 401.0);
        assert_eq!(today.day_low, 401.0);
        assert!((today.change - -4.0).abs() < 1e-9);
    }

    #[test]
    fn zero_baseline_does_not_divide() {
        let mut fields = Fields::new();
        fields.insert("previousClose".to_string(), "0".to_string());
        let quote = InstrumentQuote::from_trade("QQQ", &fields, print(1.0, 1), at(15, 0));
        assert_eq!(quote.percent_change, 0.0);
        assert!(quote.percent_change.is_finite());
    }

    #[test]
    fn fields_round_trip_is_exact() {
        let quote = InstrumentQuote {
            symbol: "AAPL".to_string(),
            current_price: 187.123_456_789_012_3,
            change: 0.1 + 0.2,
            percent_change: 1.0 / 3.0,
            day_high: 190.000_000_000_001,
            day_low: 1e-7,
            previous_close: 186.99,
            trade_timestamp: 1_741_791_600_123,
            last_update: Utc.timestamp_millis_opt(1_741_791_600_456).unwrap(),
        };

        let read = InstrumentQuote::from_fields("AAPL", &quote.to_fields(), at(0, 0));
        assert_eq!(read, quote);
    }

    #[test]
    fn lenient_read_defaults_missing_fields() {
        let now = at(15, 0);
        let read = InstrumentQuote::from_fields("AAPL", &Fields::new(), now);
        assert_eq!(read.current_price, 0.0);
        assert_eq!(read.trade_timestamp, 0);
        assert_eq!(read.last_update, now);
    }

    #[test]
    fn serializes_with_wire_names() {
        let quote = InstrumentQuote::from_trade("AAPL", &Fields::new(), print(150.0, 1000), at(15, 0));
        let json = serde_json::to_value(&quote).unwrap();
        assert_eq!(json["currentPrice"], 150.0);
        assert_eq!(json["timestamp"], 1000);
        assert_eq!(json["lastUpdate"], "2025-03-12T15:00:00.000Z");
        assert!(json.get("tradeTimestamp").is_none());
    }

    #[test]
    fn last_close_copies_current_values() {
        let quote = InstrumentQuote::from_trade("AAPL", &Fields::new(), print(150.0, 1000), at(15, 0));
        let close = LastClose::from_current(&quote.to_fields(), at(20, 0)).unwrap();
        assert_eq!(close.close_price, 150.0);
        assert_eq!(close.day_high, 150.0);
        assert_eq!(close.day_low, 150.0);
        assert_eq!(LastClose::from_fields(&close.to_fields()), Some(close));
    }

    #[test]
    fn last_close_requires_price() {
        assert!(LastClose::from_current(&Fields::new(), at(20, 0)).is_none());
    }

    #[test]
    fn crypto_wire_names() {
        let quote = CryptoQuote::from_fields("BTCUSDT", &Fields::new(), at(1, 0));
        let json = serde_json::to_value(&quote).unwrap();
        for key in [
            "symbol",
            "currentPrice",
            "change24h",
            "percentChange24h",
            "high24h",
            "low24h",
            "volume24h",
            "lastUpdate",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn status_record_round_trip() {
        let status = MarketStatus {
            is_open: false,
            status_message: StatusMessage::Closed,
            reason: "Pre-market hours".to_string(),
        };
        let fields = status_to_fields(&status, at(12, 0));
        assert_eq!(fields["isOpen"], "false");
        assert_eq!(fields["statusMessage"], "CLOSED");
        assert_eq!(status_from_fields(&fields), Some(status));
        assert_eq!(status_from_fields(&Fields::new()), None);
    }

    proptest! {
        #[test]
        fn day_range_brackets_price(prices in prop::collection::vec(0.01f64..10_000.0, 1..50)) {
            let mut fields = Fields::new();
            let mut last_high = f64::MIN;
            let mut last_low = f64::MAX;

            for (i, price) in prices.into_iter().enumerate() {
                let now = at(15, 0) + chrono::Duration::seconds(i64::try_from(i).unwrap());
                let quote = InstrumentQuote::from_trade("AAPL", &fields, print(price, 0), now);

                prop_assert!(quote.day_high >= quote.current_price);
                prop_assert!(quote.current_price >= quote.day_low);
                prop_assert!(quote.day_high >= last_high);
                prop_assert!(quote.day_low <= last_low);

                last_high = quote.day_high;
                last_low = quote.day_low;
                fields = quote.to_fields();
            }
        }
    }
}
