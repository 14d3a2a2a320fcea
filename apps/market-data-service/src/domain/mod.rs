//! Domain Layer - Core market data types and business rules.
//!
//! Pure types and functions with no I/O: the exchange calendar, the
//! instrument catalog with its store key layout, and the quote records.

/// Exchange calendar and market status.
pub mod calendar;

/// Tracked instruments and store keys.
pub mod instruments;

/// Quote records and trade-to-quote derivation.
pub mod quote;
