/// Seconds before the end of an interview in which the candidate gets the
/// final-question warning.
pub const WARNING_WINDOW_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBudget {
    Normal { remaining: i64 },
    Warning { remaining: i64 },
    Expired,
}

impl TimeBudget {
    pub fn evaluate(duration_minutes: i32, elapsed_seconds: i64) -> Self {
        let remaining = (i64::from(duration_minutes) * 60 - elapsed_seconds.max(0)).max(0);
        match remaining {
            0 => TimeBudget::Expired,
            r if r <= WARNING_WINDOW_SECS => TimeBudget::Warning { remaining: r },
            r => TimeBudget::Normal { remaining: r },
        }
    }

    pub fn remaining(self) -> i64 {
        match self {
            TimeBudget::Normal { remaining } | TimeBudget::Warning { remaining } => remaining,
            TimeBudget::Expired => 0,
        }
    }

    pub fn is_warning(self) -> bool {
        matches!(self, TimeBudget::Warning { .. })
    }
}
