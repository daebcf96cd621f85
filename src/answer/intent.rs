use crate::config::analysis::{QUANTITY_DECIMALS, QUANTITY_KEYWORD, TOTAL_DECIMALS, TOTAL_KEYWORD};

/// Which flavour of sum the query asked for; only the wording and rounding differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SumKind {
    Total,
    Quantity,
}

impl SumKind {
    pub fn decimals(self) -> usize {
        match self {
            SumKind::Total => TOTAL_DECIMALS,
            SumKind::Quantity => QUANTITY_DECIMALS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    AggregateSum(SumKind),
    GenericLookup,
}

impl Intent {
    /// Substring match on the lower-cased query. "total" is checked first, so a
    /// query mentioning both keywords is a `Total` sum.
    pub fn classify(query: &str) -> Self {
        let q = query.to_lowercase();
        if q.contains(TOTAL_KEYWORD) {
            Intent::AggregateSum(SumKind::Total)
        } else if q.contains(QUANTITY_KEYWORD) {
            Intent::AggregateSum(SumKind::Quantity)
        } else {
            Intent::GenericLookup
        }
    }
}
