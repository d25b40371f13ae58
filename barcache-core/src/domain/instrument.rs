//! Instrument classification.
//!
//! Upstream sources query market indices and single equities differently, so
//! every instrument code is classified once, here, before a download.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Codes recognized as market indices.
///
/// `sh` Shanghai composite, `sz` Shenzhen component, `hs300` CSI 300,
/// `sz50` SSE 50, `zxb` SME board, `cyb` ChiNext, `399106` Shenzhen composite.
pub const INDEX_CODES: &[&str] = &["sh", "sz", "hs300", "sz50", "zxb", "cyb", "399106"];

/// Which remote query mode an instrument needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentKind {
    Index,
    Equity,
}

impl InstrumentKind {
    /// Classify an instrument code. Anything not in [`INDEX_CODES`] is an equity.
    pub fn classify(instrument: &str) -> Self {
        if INDEX_CODES.contains(&instrument) {
            InstrumentKind::Index
        } else {
            InstrumentKind::Equity
        }
    }

    pub fn is_index(self) -> bool {
        self == InstrumentKind::Index
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstrumentKind::Index => f.write_str("index"),
            InstrumentKind::Equity => f.write_str("equity"),
        }
    }
}
