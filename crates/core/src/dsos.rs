//! Days-since-onset-of-symptoms (DSOS) encoding used on the federation wire.
//!
//! One integer carries both the symptom status and the day offset:
//!
//! | encoded value            | meaning                                        |
//! |--------------------------|------------------------------------------------|
//! | `-14..=21`               | symptomatic, exact onset day                   |
//! | `n*100-14..=n*100+21`    | symptomatic, onset within `n` days (`1..=19`)  |
//! | `1986..=2021`            | symptomatic, onset unknown                     |
//! | `2986..=3021`            | asymptomatic                                   |
//! | `3986..=4021`            | symptom status unknown                         |
//!
//! For the non-exact variants the offset is days since key submission. For
//! the range variant the offset `d` is the most recent possible onset, so the
//! onset lies between `d` and `d + n` days ago.

use serde::{Deserialize, Serialize};

use crate::model::InfectiousPeriodType;

const OFFSET_LO: i32 = -14;
const OFFSET_HI: i32 = 21;
const RANGE_WIDTH_MAX: i32 = 19;
const UNKNOWN_ONSET_BASE: i32 = 2000;
const ASYMPTOMATIC_BASE: i32 = 3000;
const UNKNOWN_STATUS_BASE: i32 = 4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DsosDecodeResult {
    SymptomaticExact { days_since_onset: i32 },
    SymptomaticRange { lo: i32, hi: i32 },
    SymptomaticUnknownOnset { days_since_submission: i32 },
    Asymptomatic { days_since_submission: i32 },
    Unknown { days_since_submission: i32 },
}

impl DsosDecodeResult {
    pub fn period_type(&self) -> InfectiousPeriodType {
        match self {
            DsosDecodeResult::Asymptomatic { .. } | DsosDecodeResult::Unknown { .. } => {
                InfectiousPeriodType::Asymptomatic
            }
            _ => InfectiousPeriodType::Symptomatic,
        }
    }

    /// Single offset used where a plain day count is needed.
    pub fn representative_day(&self) -> i32 {
        match *self {
            DsosDecodeResult::SymptomaticExact { days_since_onset } => days_since_onset,
            DsosDecodeResult::SymptomaticRange { lo, .. } => lo,
            DsosDecodeResult::SymptomaticUnknownOnset {
                days_since_submission,
            }
            | DsosDecodeResult::Asymptomatic {
                days_since_submission,
            }
            | DsosDecodeResult::Unknown {
                days_since_submission,
            } => days_since_submission,
        }
    }
}

fn in_offset_band(value: i32, base: i32) -> Option<i32> {
    let offset = value - base;
    (OFFSET_LO..=OFFSET_HI).contains(&offset).then_some(offset)
}

/// Decode an encoded DSOS value. Returns `None` for values outside every band.
pub fn decode(value: i32) -> Option<DsosDecodeResult> {
    if let Some(day) = in_offset_band(value, 0) {
        return Some(DsosDecodeResult::SymptomaticExact {
            days_since_onset: day,
        });
    }
    for width in 1..=RANGE_WIDTH_MAX {
        if let Some(day) = in_offset_band(value, width * 100) {
            return Some(DsosDecodeResult::SymptomaticRange {
                lo: day,
                hi: day + width,
            });
        }
    }
    if let Some(day) = in_offset_band(value, UNKNOWN_ONSET_BASE) {
        return Some(DsosDecodeResult::SymptomaticUnknownOnset {
            days_since_submission: day,
        });
    }
    if let Some(day) = in_offset_band(value, ASYMPTOMATIC_BASE) {
        return Some(DsosDecodeResult::Asymptomatic {
            days_since_submission: day,
        });
    }
    in_offset_band(value, UNKNOWN_STATUS_BASE).map(|day| DsosDecodeResult::Unknown {
        days_since_submission: day,
    })
}

/// Encode a locally registered key's symptom status and offset.
pub fn encode_local(symptomatic: InfectiousPeriodType, days_since_onset: i32) -> i32 {
    let day = days_since_onset.clamp(OFFSET_LO, OFFSET_HI);
    match symptomatic {
        InfectiousPeriodType::Symptomatic => day,
        InfectiousPeriodType::Asymptomatic => ASYMPTOMATIC_BASE + day,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_exact() {
        assert_eq!(
            decode(-1),
            Some(DsosDecodeResult::SymptomaticExact {
                days_since_onset: -1
            })
        );
    }

    #[test]
    fn decodes_range() {
        assert_eq!(
            decode(302),
            Some(DsosDecodeResult::SymptomaticRange { lo: 2, hi: 5 })
        );
        assert_eq!(
            decode(86),
            Some(DsosDecodeResult::SymptomaticRange { lo: -14, hi: -13 })
        );
    }

    #[test]
    fn decodes_status_bands() {
        assert_eq!(
            decode(2003),
            Some(DsosDecodeResult::SymptomaticUnknownOnset {
                days_since_submission: 3
            })
        );
        assert_eq!(
            decode(3000),
            Some(DsosDecodeResult::Asymptomatic {
                days_since_submission: 0
            })
        );
        assert_eq!(
            decode(4021),
            Some(DsosDecodeResult::Unknown {
                days_since_submission: 21
            })
        );
    }

    #[test]
    fn rejects_gaps() {
        assert_eq!(decode(22), None);
        assert_eq!(decode(2500), None);
        assert_eq!(decode(5000), None);
    }

    #[test]
    fn local_encoding_decodes_to_same_category() {
        let sym = decode(encode_local(InfectiousPeriodType::Symptomatic, 3)).unwrap();
        assert_eq!(sym.period_type(), InfectiousPeriodType::Symptomatic);
        assert_eq!(sym.representative_day(), 3);

        let asym = decode(encode_local(InfectiousPeriodType::Asymptomatic, 1)).unwrap();
        assert_eq!(asym.period_type(), InfectiousPeriodType::Asymptomatic);
        assert_eq!(asym.representative_day(), 1);
    }
}
