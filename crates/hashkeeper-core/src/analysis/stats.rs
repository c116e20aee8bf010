use crate::model::{ResultLabel, VerificationStats};

/// Fold per-label counts (as returned by the history store) into totals.
pub fn verification_stats<I>(counts: I) -> VerificationStats
where
    I: IntoIterator<Item = (ResultLabel, u64)>,
{
    let mut stats = VerificationStats::default();
    for (label, count) in counts {
        stats.add(label, count);
    }
    stats
}

impl VerificationStats {
    /// Share of verifications that matched, if any verification ran.
    pub fn match_rate(&self) -> Option<f64> {
        let verified = self.verified_match + self.verified_fail;
        (verified > 0).then(|| self.verified_match as f64 / verified as f64)
    }
}
