//! Qualified-ticker helpers.
//!
//! Instrument tickers are qualified as `CODE.EXCHANGE` (e.g. `BHP.AU`);
//! the trailing segment selects the exchange for bulk operations.

/// Split a qualified ticker into `(code, exchange)`.
///
/// A ticker without a dot has no exchange: the exchange comes back empty
/// and the ticker cannot be batched into a bulk EOD job.
pub fn split_ticker(ticker: &str) -> (&str, &str) {
    match ticker.rfind('.') {
        Some(idx) => (&ticker[..idx], &ticker[idx + 1..]),
        None => (ticker, ""),
    }
}

/// The exchange segment of a qualified ticker, empty when unqualified.
pub fn exchange_of(ticker: &str) -> &str {
    split_ticker(ticker).1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_qualified_ticker() {
        assert_eq!(split_ticker("BHP.AU"), ("BHP", "AU"));
        assert_eq!(exchange_of("BHP.AU"), "AU");
    }

    #[test]
    fn last_dot_wins() {
        assert_eq!(split_ticker("BRK.A.US"), ("BRK.A", "US"));
        assert_eq!(exchange_of("BRK.A.US"), "US");
    }

    #[test]
    fn unqualified_ticker_has_no_exchange() {
        assert_eq!(split_ticker("BHP"), ("BHP", ""));
        assert_eq!(exchange_of("BHP"), "");
    }

    #[test]
    fn trailing_dot_yields_empty_exchange() {
        assert_eq!(split_ticker("BHP."), ("BHP", ""));
    }
}
