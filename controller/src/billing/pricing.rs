use crate::db::models::PriceRow;

/// Reserved price-table key that sets the CPU price per 100% core-minute
/// instead of a GPU price per minute.
pub const CPU_CORE_KEY: &str = "CPU_CORE";

/// Immutable longest-prefix price index, built fresh from the `prices`
/// table inside every ingest transaction (§4.1 step 2). Matching is
/// substring-contains against the reported GPU model string, tried in
/// order from longest prefix to shortest so `"RTX 3090"` is preferred over
/// `"RTX 30"` when both are configured. Ties on length are broken
/// lexicographically-greater, matching the source's `sort.Slice`
/// comparator exactly.
pub struct PriceIndex {
    // Ordered longest-first; (prefix, price_per_minute).
    entries: Vec<(String, f64)>,
}

impl PriceIndex {
    pub fn build(rows: Vec<PriceRow>) -> Self {
        let mut entries: Vec<(String, f64)> = rows
            .into_iter()
            .filter_map(|r| {
                let prefix = r.gpu_model_prefix.trim().to_string();
                if prefix.is_empty() {
                    None
                } else {
                    Some((prefix, r.price_per_minute))
                }
            })
            .collect();

        entries.sort_by(|(a, _), (b, _)| match b.len().cmp(&a.len()) {
            std::cmp::Ordering::Equal => b.cmp(a),
            other => other,
        });

        Self { entries }
    }

    /// The configured CPU price per 100% core-minute, if the reserved
    /// `CPU_CORE` key is present.
    pub fn cpu_core_price(&self) -> Option<f64> {
        self.entries
            .iter()
            .find(|(prefix, _)| prefix == CPU_CORE_KEY)
            .map(|(_, price)| *price)
    }

    /// Longest-prefix match of a reported GPU model string against every
    /// configured GPU price prefix (the reserved `CPU_CORE` key never
    /// matches here — it is consulted only via [`PriceIndex::cpu_core_price`]).
    pub fn match_gpu_price(&self, gpu_model: &str) -> Option<f64> {
        self.entries
            .iter()
            .filter(|(prefix, _)| prefix != CPU_CORE_KEY)
            .find(|(prefix, _)| gpu_model.contains(prefix.as_str()))
            .map(|(_, price)| *price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(prefix: &str, price: f64) -> PriceRow {
        PriceRow {
            gpu_model_prefix: prefix.into(),
            price_per_minute: price,
            updated_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn longest_prefix_wins() {
        let idx = PriceIndex::build(vec![row("RTX 3090", 0.2), row("RTX 30", 0.1)]);
        assert_eq!(idx.match_gpu_price("NVIDIA RTX 3090 24GB"), Some(0.2));
    }

    #[test]
    fn falls_back_when_no_prefix_matches() {
        let idx = PriceIndex::build(vec![row("A100", 0.5)]);
        assert_eq!(idx.match_gpu_price("UnknownCard"), None);
    }

    #[test]
    fn cpu_core_key_is_excluded_from_gpu_matching() {
        let idx = PriceIndex::build(vec![row(CPU_CORE_KEY, 0.01)]);
        assert_eq!(idx.match_gpu_price("CPU_CORE"), None);
        assert_eq!(idx.cpu_core_price(), Some(0.01));
    }

    #[test]
    fn equal_length_ties_broken_lexicographically_greater() {
        let idx = PriceIndex::build(vec![row("AAA", 0.1), row("AAB", 0.2)]);
        // "AAB" > "AAA" lexicographically, so it's tried first.
        assert_eq!(idx.match_gpu_price("AAB card"), Some(0.2));
    }

    #[test]
    fn blank_prefix_rows_are_ignored() {
        let idx = PriceIndex::build(vec![row("  ", 0.3)]);
        assert_eq!(idx.match_gpu_price("anything"), None);
    }
}
