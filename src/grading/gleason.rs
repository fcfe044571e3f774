//! Gleason grading of a slide from per-class tile prediction counts.

use serde::{Deserialize, Serialize};

use super::GradingError;

/// Number of count bins: no grade, then Gleason 3, 4 and 5.
pub const GRADE_BINS: usize = 4;

/// Gleason pattern of bin 1; bins 2 and 3 follow.
const FIRST_PATTERN: u8 = 3;

/// Primary and secondary Gleason pattern of a slide, each in `{0, 3, 4, 5}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GleasonGrade {
    pub primary: u8,
    pub secondary: u8,
}

impl GleasonGrade {
    pub const fn new(primary: u8, secondary: u8) -> Self {
        Self { primary, secondary }
    }

    /// `primary + secondary`; only 0 and 6..=10 are clinically valid.
    pub fn gleason_score(&self) -> u16 {
        u16::from(self.primary) + u16::from(self.secondary)
    }

    /// ISUP grade group for this pattern pair.
    pub fn isup_grade(&self) -> Result<u8, GradingError> {
        let grade = match (self.primary, self.secondary) {
            (0, 0) => 0,
            (3, 3) => 1,
            (3, 4) => 2,
            (4, 3) => 3,
            (3, 5) | (4, 4) | (5, 3) => 4,
            (4, 5) | (5, 4) | (5, 5) => 5,
            _ => return Err(GradingError::UnknownIsupPair(*self)),
        };
        Ok(grade)
    }
}

/// Derive a slide grade from tile prediction counts per bin.
///
/// A single graded bin yields a pure grade (3+3, 4+4, 5+5). With two or more, the
/// graded bins are ranked by count with a stable ascending sort; primary is the last
/// (largest) and secondary the one before it, so on equal counts the higher bin ranks
/// above the lower one.
///
/// `confidences` and `confidence_threshold` are reserved for suppressing low-confidence
/// outlier bins and do not affect the result.
pub fn grade_from_counts(
    counts: [u32; GRADE_BINS],
    _confidences: [f32; GRADE_BINS],
    _confidence_threshold: f32,
) -> GleasonGrade {
    let graded = [counts[1], counts[2], counts[3]];
    match graded {
        [0, 0, 0] => GleasonGrade::new(0, 0),
        [_, 0, 0] => GleasonGrade::new(3, 3),
        [0, _, 0] => GleasonGrade::new(4, 4),
        [0, 0, _] => GleasonGrade::new(5, 5),
        _ => {
            let mut order = [0usize, 1, 2];
            order.sort_by_key(|&bin| graded[bin]);
            GleasonGrade::new(
                order[2] as u8 + FIRST_PATTERN,
                order[1] as u8 + FIRST_PATTERN,
            )
        }
    }
}
