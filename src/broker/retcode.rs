//! Broker trade retcode classification.
//!
//! The venue answers every deal request with a numeric status. The class of
//! that status decides the whole control flow downstream: retry with a fresh
//! price, surface a typed failure, or stop trading entirely. Unknown codes
//! classify Fatal; guessing that an unrecognized status is harmless is how
//! positions get orphaned.

/// Request completed.
pub const DONE: u32 = 10009;
/// Only part of the request completed.
pub const PARTIAL_FILL: u32 = 10010;

pub const REQUOTE: u32 = 10004;
pub const PRICES_CHANGED: u32 = 10020;
pub const NO_QUOTES: u32 = 10021;
pub const REQUOTE_ALT: u32 = 10025;
pub const CONTEXT_BUSY: u32 = 10012;
pub const POSITION_FROZEN: u32 = 10011;
pub const TOO_FREQUENT: u32 = 10024;

pub const MARKET_CLOSED: u32 = 10018;

pub const TRADE_DISABLED: u32 = 10017;
pub const INSUFFICIENT_FUNDS: u32 = 10019;
pub const AUTOTRADING_DISABLED_SERVER: u32 = 10026;
pub const AUTOTRADING_DISABLED_CLIENT: u32 = 10027;
pub const INVALID_ACCOUNT: u32 = 10031;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetcodeClass {
    /// Full success.
    Done,
    /// Price moved or the venue was briefly busy. Worth one more try with a
    /// fresh tick.
    Retryable,
    /// Well-formed failure that retrying will not fix and that does not make
    /// continued trading unsafe (partial fill, market closed).
    NonFatal,
    /// Trading cannot safely continue from inside the process.
    Fatal,
}

pub fn classify(retcode: u32) -> RetcodeClass {
    match retcode {
        DONE => RetcodeClass::Done,
        REQUOTE | PRICES_CHANGED | NO_QUOTES | REQUOTE_ALT | CONTEXT_BUSY | POSITION_FROZEN
        | TOO_FREQUENT => RetcodeClass::Retryable,
        PARTIAL_FILL | MARKET_CLOSED => RetcodeClass::NonFatal,
        // Everything else, known-fatal or unknown, stops the attempt cold.
        _ => RetcodeClass::Fatal,
    }
}

pub fn describe(retcode: u32) -> &'static str {
    match retcode {
        10004 => "Requote - price changed",
        10006 => "Request rejected",
        10007 => "Request canceled by trader",
        10009 => "Request completed",
        10010 => "Only part of request completed",
        10011 => "Position is frozen",
        10012 => "Context busy",
        10013 => "Invalid request",
        10014 => "Invalid volume",
        10015 => "Invalid price",
        10016 => "Invalid stops (SL/TP)",
        10017 => "Trade disabled",
        10018 => "Market closed",
        10019 => "Insufficient funds",
        10020 => "Prices changed",
        10021 => "No quotes",
        10022 => "Invalid order expiration",
        10024 => "Too frequent requests",
        10025 => "Requote",
        10026 => "AutoTrading disabled by server",
        10027 => "AutoTrading disabled in terminal",
        10030 => "Invalid SL/TP for this symbol",
        10031 => "Invalid account",
        _ => "Unknown error",
    }
}
