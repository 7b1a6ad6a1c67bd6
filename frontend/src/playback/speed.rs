use std::fmt;

/// Replay speed as `digit × 10^exponent`, addressed by a slider step.
///
/// Steps `0..=MAX_STEP` run through the digits 1 to 9 of every decade from
/// 10^-6 to 10^6, so step 0 is `1e-6`, step 54 is `1` and the last step is
/// `9e6`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Speed {
    step: u8,
}

impl Speed {
    pub const MAX_STEP: u8 = 116;
    pub const MIN_EXPONENT: i32 = -6;
    pub const REAL_TIME: Speed = Speed { step: 54 };

    pub fn from_step(step: u8) -> Option<Self> {
        (step <= Self::MAX_STEP).then_some(Speed { step })
    }

    /// Nearest slider step to an arbitrary factor, compared on a log scale.
    pub fn nearest(factor: f64) -> Self {
        if !factor.is_finite() || factor <= 0.0 {
            return Speed { step: 0 };
        }
        let target = factor.log10();
        (0..=Self::MAX_STEP)
            .map(|step| Speed { step })
            .min_by(|a, b| {
                let da = (a.factor().log10() - target).abs();
                let db = (b.factor().log10() - target).abs();
                da.total_cmp(&db)
            })
            .unwrap_or(Self::REAL_TIME)
    }

    pub fn step(self) -> u8 {
        self.step
    }

    pub fn digit(self) -> u8 {
        1 + self.step % 9
    }

    pub fn exponent(self) -> i32 {
        Self::MIN_EXPONENT + i32::from(self.step / 9)
    }

    /// Virtual milliseconds per wall-clock millisecond.
    pub fn factor(self) -> f64 {
        f64::from(self.digit()) * 10f64.powi(self.exponent())
    }

    pub fn faster(self) -> Self {
        Speed {
            step: (self.step + 1).min(Self::MAX_STEP),
        }
    }

    pub fn slower(self) -> Self {
        Speed {
            step: self.step.saturating_sub(1),
        }
    }
}

impl Default for Speed {
    fn default() -> Self {
        Self::REAL_TIME
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let exponent = self.exponent();
        if exponent >= 0 {
            write!(f, "{}x", u64::from(self.digit()) * 10u64.pow(exponent.unsigned_abs()))
        } else {
            let decimals = exponent.unsigned_abs() as usize;
            write!(f, "{:.*}x", decimals, self.factor())
        }
    }
}
