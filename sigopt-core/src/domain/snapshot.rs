//! MarketSnapshot: one externally produced observation of a symbol.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A malformed snapshot field. The tick is skipped, never fatal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("{symbol} @ {timestamp}: missing field '{field}'")]
    MissingField {
        symbol: String,
        timestamp: NaiveDateTime,
        field: &'static str,
    },
    #[error("{symbol} @ {timestamp}: field '{field}' is not finite")]
    NonFinite {
        symbol: String,
        timestamp: NaiveDateTime,
        field: &'static str,
    },
    #[error("{symbol} @ {timestamp}: inconsistent OHLC (o={open}, h={high}, l={low}, c={close})")]
    InsaneOhlc {
        symbol: String,
        timestamp: NaiveDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
    #[error("{symbol} @ {timestamp}: atr must be positive, got {atr}")]
    NonPositiveAtr {
        symbol: String,
        timestamp: NaiveDateTime,
        atr: f64,
    },
}

/// One snapshot as read from the store.
///
/// Every numeric field is optional because the store tolerates gaps; use
/// [`MarketSnapshot::tick`] and [`MarketSnapshot::entry_fields`] to obtain
/// validated views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub timestamp: NaiveDateTime,
    #[serde(default)]
    pub open: Option<f64>,
    #[serde(default)]
    pub high: Option<f64>,
    #[serde(default)]
    pub low: Option<f64>,
    #[serde(default)]
    pub close: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub atr: Option<f64>,
    #[serde(default)]
    pub support: Option<f64>,
    #[serde(default)]
    pub resistance: Option<f64>,
    #[serde(default)]
    pub signal_score: Option<f64>,
    #[serde(default)]
    pub indicator_consensus: Option<u32>,
}

/// Validated OHLC of a single snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Tick {
    /// True when the tick closed at or above its open.
    pub fn is_bullish(&self) -> bool {
        self.close >= self.open
    }
}

/// Everything needed to open a theoretical trade at this snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryFields {
    pub tick: Tick,
    pub atr: f64,
    pub support: f64,
    pub resistance: f64,
    pub signal_score: f64,
    pub indicator_consensus: u32,
}

impl MarketSnapshot {
    fn require(&self, value: Option<f64>, field: &'static str) -> Result<f64, DataError> {
        let v = value.ok_or_else(|| DataError::MissingField {
            symbol: self.symbol.clone(),
            timestamp: self.timestamp,
            field,
        })?;
        if !v.is_finite() {
            return Err(DataError::NonFinite {
                symbol: self.symbol.clone(),
                timestamp: self.timestamp,
                field,
            });
        }
        Ok(v)
    }

    /// Validated OHLC. Volume is not required for replay.
    pub fn tick(&self) -> Result<Tick, DataError> {
        let open = self.require(self.open, "open")?;
        let high = self.require(self.high, "high")?;
        let low = self.require(self.low, "low")?;
        let close = self.require(self.close, "close")?;

        let sane = high >= low
            && high >= open
            && high >= close
            && low <= open
            && low <= close
            && low > 0.0;
        if !sane {
            return Err(DataError::InsaneOhlc {
                symbol: self.symbol.clone(),
                timestamp: self.timestamp,
                open,
                high,
                low,
                close,
            });
        }
        Ok(Tick {
            open,
            high,
            low,
            close,
        })
    }

    /// Validated entry view: OHLCV plus every indicator field.
    pub fn entry_fields(&self) -> Result<EntryFields, DataError> {
        let tick = self.tick()?;
        self.require(self.volume, "volume")?;
        let atr = self.require(self.atr, "atr")?;
        if atr <= 0.0 {
            return Err(DataError::NonPositiveAtr {
                symbol: self.symbol.clone(),
                timestamp: self.timestamp,
                atr,
            });
        }
        let support = self.require(self.support, "support")?;
        let resistance = self.require(self.resistance, "resistance")?;
        let signal_score = self.require(self.signal_score, "signal_score")?;
        let indicator_consensus =
            self.indicator_consensus
                .ok_or_else(|| DataError::MissingField {
                    symbol: self.symbol.clone(),
                    timestamp: self.timestamp,
                    field: "indicator_consensus",
                })?;

        Ok(EntryFields {
            tick,
            atr,
            support,
            resistance,
            signal_score,
            indicator_consensus,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample() -> MarketSnapshot {
        MarketSnapshot {
            symbol: "BTC".into(),
            timestamp: NaiveDate::from_ymd_opt(2025, 3, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
            open: Some(100.0),
            high: Some(101.0),
            low: Some(99.0),
            close: Some(100.5),
            volume: Some(1_000.0),
            atr: Some(1.2),
            support: Some(97.0),
            resistance: Some(104.0),
            signal_score: Some(72.0),
            indicator_consensus: Some(3),
        }
    }

    #[test]
    fn complete_snapshot_validates() {
        let fields = sample().entry_fields().unwrap();
        assert_eq!(fields.tick.close, 100.5);
        assert_eq!(fields.indicator_consensus, 3);
    }

    #[test]
    fn missing_atr_is_data_error() {
        let mut snap = sample();
        snap.atr = None;
        let err = snap.entry_fields().unwrap_err();
        assert!(matches!(err, DataError::MissingField { field: "atr", .. }));
        // OHLC is still usable for replay
        assert!(snap.tick().is_ok());
    }

    #[test]
    fn nan_close_is_rejected() {
        let mut snap = sample();
        snap.close = Some(f64::NAN);
        assert!(matches!(
            snap.tick().unwrap_err(),
            DataError::NonFinite { field: "close", .. }
        ));
    }

    #[test]
    fn high_below_low_is_insane() {
        let mut snap = sample();
        snap.high = Some(98.0);
        assert!(matches!(snap.tick().unwrap_err(), DataError::InsaneOhlc { .. }));
    }

    #[test]
    fn zero_atr_rejected() {
        let mut snap = sample();
        snap.atr = Some(0.0);
        assert!(matches!(
            snap.entry_fields().unwrap_err(),
            DataError::NonPositiveAtr { .. }
        ));
    }

    #[test]
    fn tolerates_extra_and_missing_fields_in_json() {
        let json = r#"{
            "symbol": "ETH",
            "timestamp": "2025-03-01T12:00:00",
            "close": 3000.0,
            "trend_4h": "bullish"
        }"#;
        let snap: MarketSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snap.close, Some(3000.0));
        assert!(snap.open.is_none());
    }
}
