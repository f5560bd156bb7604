//! Synthetic filler keys that keep small publications from revealing exact
//! case counts.

use std::sync::Arc;

use dkpublish_core::clock::rolling_start_number_days_ago;
use dkpublish_core::model::ROLLING_PERIOD_MAX;
use dkpublish_core::{
    DailyKey, FederationTekInfo, InfectiousPeriodType, LocalTekInfo, ReportType,
    TransmissionRiskCalculation, TransmissionRiskLevel, DAILY_KEY_BYTE_COUNT,
};
use dkpublish_storage::StagedKey;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use time::OffsetDateTime;

pub struct StuffingGenerator {
    tek_count_min: usize,
    lifetime_days: i64,
    calculation: Arc<dyn TransmissionRiskCalculation>,
}

impl StuffingGenerator {
    pub fn new(
        tek_count_min: usize,
        lifetime_days: i64,
        calculation: Arc<dyn TransmissionRiskCalculation>,
    ) -> Self {
        StuffingGenerator {
            tek_count_min,
            lifetime_days,
            calculation,
        }
    }

    /// Number of filler keys that tops `real_count` up to the minimum.
    pub fn count(&self, real_count: usize) -> usize {
        self.tek_count_min.saturating_sub(real_count)
    }

    /// Filler keys for a publication of `real_count` genuine keys.
    ///
    /// Keys get random bytes, a day offset drawn from the days the risk
    /// calculator assigns a level to, and a day-aligned rolling start within
    /// the publication lifetime before `now`.
    pub fn generate(&self, real_count: usize, now: OffsetDateTime) -> Vec<StagedKey> {
        let (lo, hi) = self.calculation.significant_day_range();
        let mut days: Vec<i32> = (lo..=hi)
            .filter(|day| self.calculation.calculate(*day) != TransmissionRiskLevel::None)
            .collect();
        if days.is_empty() {
            days.push(lo);
        }

        let mut rng = OsRng;
        (0..self.count(real_count))
            .map(|_| {
                let mut key_data = vec![0u8; DAILY_KEY_BYTE_COUNT];
                rng.fill_bytes(&mut key_data);
                let day = days[rng.gen_range(0..days.len())];
                let days_ago = rng.gen_range(0..self.lifetime_days.max(1));
                StagedKey {
                    id: 0,
                    source_id: None,
                    daily_key: DailyKey::new(
                        key_data,
                        rolling_start_number_days_ago(now, days_ago),
                        ROLLING_PERIOD_MAX,
                    ),
                    local: LocalTekInfo {
                        transmission_risk_level: Some(self.calculation.calculate(day)),
                        days_since_symptoms_onset: Some(day),
                        symptomatic: InfectiousPeriodType::Symptomatic,
                        report_type: ReportType::ConfirmedTest,
                    },
                    federation: FederationTekInfo {
                        report_type: ReportType::ConfirmedTest,
                        days_since_symptoms_onset: day,
                        ..FederationTekInfo::default()
                    },
                    used: false,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publishing::has_transmission_risk;
    use dkpublish_core::clock::rolling_start_number;
    use dkpublish_core::StandardTrlCalculation;
    use time::macros::datetime;

    fn generator(min: usize) -> StuffingGenerator {
        StuffingGenerator::new(min, 14, Arc::new(StandardTrlCalculation))
    }

    #[test]
    fn tops_up_to_minimum_only() {
        let g = generator(5);
        for real in 0..12 {
            let expected = 5usize.saturating_sub(real);
            assert_eq!(g.count(real), expected);
            assert_eq!(g.generate(real, datetime!(2020-10-23 12:00:00 UTC)).len(), expected);
        }
    }

    #[test]
    fn filler_keys_look_like_published_keys() {
        let now = datetime!(2020-10-23 12:00:00 UTC);
        let keys = generator(50).generate(0, now);
        let today = rolling_start_number(now);
        for key in &keys {
            assert_eq!(key.source_id, None);
            assert_eq!(key.daily_key.key_data.len(), DAILY_KEY_BYTE_COUNT);
            assert_eq!(key.daily_key.rolling_period, 144);
            assert_eq!(key.daily_key.rolling_start_number % 144, 0);
            assert!(key.daily_key.rolling_start_number <= today);
            assert!(key.daily_key.rolling_start_number > today - 14 * 144);
            assert!(has_transmission_risk(key));
        }
        let distinct: std::collections::HashSet<_> =
            keys.iter().map(|k| k.daily_key.key_data.clone()).collect();
        assert_eq!(distinct.len(), keys.len());
    }
}
