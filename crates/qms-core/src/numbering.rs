/// Human-readable record numbers. The sequence itself comes from the store
/// (per collection, per year); this is only the presentation format.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NumberSeries {
    Audit,
    Finding,
    Action,
}

impl NumberSeries {
    pub fn prefix(&self) -> &'static str {
        match self {
            NumberSeries::Audit => "AUD",
            NumberSeries::Finding => "HAL",
            NumberSeries::Action => "ACC",
        }
    }

    /// Sequence key used by `DocumentStore::next_sequence`.
    pub fn collection(&self) -> &'static str {
        match self {
            NumberSeries::Audit => "audits",
            NumberSeries::Finding => "findings",
            NumberSeries::Action => "actions",
        }
    }
}

pub fn format_number(series: NumberSeries, year: i32, sequence: u64) -> String {
    format!("{}-{}-{:05}", series.prefix(), year, sequence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_zero_padding() {
        assert_eq!(format_number(NumberSeries::Audit, 2026, 1), "AUD-2026-00001");
        assert_eq!(format_number(NumberSeries::Finding, 2026, 42), "HAL-2026-00042");
        assert_eq!(format_number(NumberSeries::Action, 2025, 12345), "ACC-2025-12345");
    }
}
