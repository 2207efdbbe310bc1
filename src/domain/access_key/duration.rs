//! Ban and suspension durations as entered by admins (`1h`, `2d`, `1w`, `permanent`)

use chrono::{DateTime, Duration, Utc};

use crate::domain::DomainError;

/// How long a ban or suspension lasts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PenaltyDuration {
    /// Lasts until lifted by an admin
    Permanent,
    /// Lapses on its own after the given span
    Timed(Duration),
}

impl PenaltyDuration {
    /// Parse `permanent` or `<n>h`, `<n>d`, `<n>w` with `n >= 1`
    pub fn parse(input: &str) -> Result<Self, DomainError> {
        let input = input.trim().to_ascii_lowercase();

        if input == "permanent" {
            return Ok(Self::Permanent);
        }

        let invalid = || {
            DomainError::validation(format!(
                "Invalid duration '{}'. Use 'permanent' or a number followed by h, d or w (e.g. 12h, 1d, 2w)",
                input
            ))
        };

        let unit = input.chars().last().ok_or_else(invalid)?;
        let amount: i64 = input[..input.len() - unit.len_utf8()]
            .parse()
            .map_err(|_| invalid())?;

        if amount < 1 {
            return Err(invalid());
        }

        let span = match unit {
            'h' => Duration::try_hours(amount),
            'd' => Duration::try_days(amount),
            'w' => Duration::try_weeks(amount),
            _ => None,
        }
        .ok_or_else(invalid)?;

        Ok(Self::Timed(span))
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent)
    }

    /// End of the penalty when it starts at `now`; `None` for permanent
    ///
    /// A timed span whose end cannot be represented is a validation error
    /// rather than a silent upgrade to permanent.
    pub fn ends_at(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, DomainError> {
        match self {
            Self::Permanent => Ok(None),
            Self::Timed(span) => now.checked_add_signed(*span).map(Some).ok_or_else(|| {
                DomainError::validation(
                    "Duration is too long; use 'permanent' for an open-ended penalty",
                )
            }),
        }
    }
}

impl std::str::FromStr for PenaltyDuration {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
