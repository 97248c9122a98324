//! Numeric one-time codes and their validity windows.

use chrono::{DateTime, Utc};
use rand::{thread_rng, Rng};
use std::time::Duration;

pub const OTP_LENGTH: usize = 6;

/// Uniformly random, zero-padded 6-digit code.
pub fn generate_code() -> String {
    let value: u32 = thread_rng().gen_range(0..1_000_000);
    format!("{:0width$}", value, width = OTP_LENGTH)
}

/// True when `issued_at` is strictly older than `window` at `now`.
pub fn is_expired(issued_at: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    match chrono::Duration::from_std(window) {
        Ok(window) => now.signed_duration_since(issued_at) > window,
        Err(_) => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpCheck {
    Valid,
    Expired,
    Mismatch,
}

/// Age is checked before the value, so a stale code reports `Expired`
/// even when it matches.
pub fn check(
    stored: &str,
    issued_at: DateTime<Utc>,
    submitted: &str,
    window: Duration,
    now: DateTime<Utc>,
) -> OtpCheck {
    if is_expired(issued_at, now, window) {
        OtpCheck::Expired
    } else if stored != submitted.trim() {
        OtpCheck::Mismatch
    } else {
        OtpCheck::Valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    const WINDOW: Duration = Duration::from_secs(600);

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..200 {
            let code = generate_code();
            assert_eq!(code.len(), OTP_LENGTH);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[rstest]
    #[case(0, false)]
    #[case(599, false)]
    #[case(600, false)]
    #[case(601, true)]
    #[case(86_400, true)]
    fn expiry_boundary(#[case] age_secs: i64, #[case] expired: bool) {
        let now = Utc::now();
        let issued = now - chrono::Duration::seconds(age_secs);
        assert_eq!(is_expired(issued, now, WINDOW), expired);
    }

    #[test]
    fn stale_matching_code_reports_expired() {
        let now = Utc::now();
        let issued = now - chrono::Duration::minutes(11);
        assert_eq!(
            check("123456", issued, "123456", WINDOW, now),
            OtpCheck::Expired
        );
    }

    #[test]
    fn fresh_wrong_code_reports_mismatch() {
        let now = Utc::now();
        assert_eq!(
            check("123456", now, "654321", WINDOW, now),
            OtpCheck::Mismatch
        );
        assert_eq!(check("123456", now, " 123456 ", WINDOW, now), OtpCheck::Valid);
    }

    proptest! {
        #[test]
        fn any_code_older_than_window_is_rejected(extra in 1i64..1_000_000, code in "[0-9]{6}") {
            let now = Utc::now();
            let issued = now - chrono::Duration::seconds(600 + extra);
            prop_assert_eq!(check(&code, issued, &code, WINDOW, now), OtpCheck::Expired);
        }
    }
}
