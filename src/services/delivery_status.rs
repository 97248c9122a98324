//! Delivery state machine.
//!
//! ```text
//! PROCESSING --pick-up--> PICKED_UP --in-transit--> IN_TRANSIT --delivered(otp)--> DELIVERED
//!      \                      \                         \
//!       +-------cancel--------+----------cancel----------+--> CANCELLED
//! ```
//!
//! Everything here is pure; the delivery service applies the result.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::auth::otp::{self, OtpCheck};
use crate::entities::delivery::DeliveryStatus;
use crate::errors::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryAction {
    PickUp,
    InTransit,
    Deliver,
    Cancel,
    ResendOtp,
}

impl DeliveryAction {
    pub const ALL: [DeliveryAction; 5] = [
        DeliveryAction::PickUp,
        DeliveryAction::InTransit,
        DeliveryAction::Deliver,
        DeliveryAction::Cancel,
        DeliveryAction::ResendOtp,
    ];
}

fn reject(message: &str) -> Result<DeliveryStatus, ServiceError> {
    Err(ServiceError::InvalidStatus(message.to_string()))
}

const ALREADY_DELIVERED: &str = "Order is already delivered";
const ALREADY_IN_TRANSIT: &str = "Order is already in transit";
const CANCELLED: &str = "Delivery has been cancelled";
const NOT_IN_TRANSIT: &str = "Order is not in transit";

/// Returns the status the delivery moves to, or the reason the action is
/// not allowed from `current`. `ResendOtp` keeps the status unchanged.
pub fn next_status(
    current: DeliveryStatus,
    action: DeliveryAction,
) -> Result<DeliveryStatus, ServiceError> {
    use DeliveryAction as A;
    use DeliveryStatus as S;

    match (action, current) {
        (A::Cancel, S::Delivered) => reject("Delivered orders cannot be cancelled"),
        (A::Cancel, S::Cancelled) => reject("Delivery is already cancelled"),
        (_, S::Delivered) => reject(ALREADY_DELIVERED),
        (_, S::Cancelled) => reject(CANCELLED),

        (A::PickUp, S::Processing) => Ok(S::PickedUp),
        (A::PickUp, S::PickedUp) => reject("Order is already picked up"),
        (A::PickUp, S::InTransit) => reject(ALREADY_IN_TRANSIT),

        (A::InTransit, S::PickedUp) => Ok(S::InTransit),
        (A::InTransit, S::Processing) => reject("Order has not been picked up yet"),
        (A::InTransit, S::InTransit) => reject(ALREADY_IN_TRANSIT),

        (A::Deliver, S::InTransit) => Ok(S::Delivered),
        (A::Deliver, _) => reject(NOT_IN_TRANSIT),

        (A::ResendOtp, S::InTransit) => Ok(S::InTransit),
        (A::ResendOtp, _) => reject(NOT_IN_TRANSIT),

        (A::Cancel, _) => Ok(S::Cancelled),
    }
}

/// Proof-of-delivery check. Age is tested before the value, so a stale
/// code is reported as expired even when it matches.
pub fn verify_delivery_otp(
    stored: Option<&str>,
    issued_at: Option<DateTime<Utc>>,
    submitted: Option<&str>,
    window: Duration,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    let submitted = submitted
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ServiceError::ValidationError("OTP is required".to_string()))?;

    let (stored, issued_at) = match (stored, issued_at) {
        (Some(code), Some(at)) => (code, at),
        _ => {
            return Err(ServiceError::InvalidOtp(
                "No OTP has been issued for this delivery".to_string(),
            ))
        }
    };

    match otp::check(stored, issued_at, submitted, window, now) {
        OtpCheck::Valid => Ok(()),
        OtpCheck::Expired => Err(ServiceError::ExpiredCredential(
            "OTP has expired. Please request a new one.".to_string(),
        )),
        OtpCheck::Mismatch => Err(ServiceError::InvalidOtp("Invalid OTP provided.".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;
    use rstest::rstest;
    use DeliveryAction as A;
    use DeliveryStatus as S;

    const WINDOW: Duration = Duration::from_secs(15 * 60);

    #[rstest]
    #[case(S::Processing, A::PickUp, S::PickedUp)]
    #[case(S::PickedUp, A::InTransit, S::InTransit)]
    #[case(S::InTransit, A::Deliver, S::Delivered)]
    #[case(S::InTransit, A::ResendOtp, S::InTransit)]
    #[case(S::Processing, A::Cancel, S::Cancelled)]
    #[case(S::PickedUp, A::Cancel, S::Cancelled)]
    #[case(S::InTransit, A::Cancel, S::Cancelled)]
    fn allowed_transitions(
        #[case] from: DeliveryStatus,
        #[case] action: DeliveryAction,
        #[case] to: DeliveryStatus,
    ) {
        assert_eq!(next_status(from, action).unwrap(), to);
    }

    #[rstest]
    #[case(S::InTransit, A::PickUp, "already in transit")]
    #[case(S::Delivered, A::PickUp, "already delivered")]
    #[case(S::Cancelled, A::PickUp, "cancelled")]
    #[case(S::PickedUp, A::PickUp, "already picked up")]
    #[case(S::Processing, A::InTransit, "not been picked up")]
    #[case(S::Processing, A::Deliver, "not in transit")]
    #[case(S::PickedUp, A::Deliver, "not in transit")]
    #[case(S::Delivered, A::Deliver, "already delivered")]
    #[case(S::Delivered, A::Cancel, "cannot be cancelled")]
    #[case(S::Cancelled, A::Cancel, "already cancelled")]
    #[case(S::Delivered, A::ResendOtp, "already delivered")]
    #[case(S::PickedUp, A::ResendOtp, "not in transit")]
    fn rejected_transitions(
        #[case] from: DeliveryStatus,
        #[case] action: DeliveryAction,
        #[case] reason: &str,
    ) {
        assert_matches!(
            next_status(from, action),
            Err(ServiceError::InvalidStatus(msg)) if msg.contains(reason)
        );
    }

    #[test]
    fn terminal_states_accept_nothing() {
        for status in [S::Delivered, S::Cancelled] {
            for action in DeliveryAction::ALL {
                assert!(next_status(status, action).is_err(), "{status} {action:?}");
            }
        }
    }

    fn action_strategy() -> impl Strategy<Value = DeliveryAction> {
        prop::sample::select(DeliveryAction::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn delivered_is_only_reached_through_in_transit(actions in prop::collection::vec(action_strategy(), 0..20)) {
            let mut status = S::Processing;
            let mut visited_in_transit = false;
            for action in actions {
                if let Ok(next) = next_status(status, action) {
                    if next == S::Delivered {
                        prop_assert_eq!(status, S::InTransit);
                        prop_assert!(visited_in_transit);
                    }
                    status = next;
                    visited_in_transit |= status == S::InTransit;
                }
            }
        }
    }

    #[test]
    fn matching_fresh_otp_passes() {
        let now = Utc::now();
        assert!(verify_delivery_otp(Some("493021"), Some(now), Some("493021"), WINDOW, now).is_ok());
    }

    #[test]
    fn missing_submission_is_a_validation_error() {
        let now = Utc::now();
        assert_matches!(
            verify_delivery_otp(Some("493021"), Some(now), None, WINDOW, now),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            verify_delivery_otp(Some("493021"), Some(now), Some("  "), WINDOW, now),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn expired_otp_is_distinct_from_wrong_otp() {
        let now = Utc::now();
        let stale = now - chrono::Duration::minutes(16);

        assert_matches!(
            verify_delivery_otp(Some("493021"), Some(stale), Some("493021"), WINDOW, now),
            Err(ServiceError::ExpiredCredential(_))
        );
        assert_matches!(
            verify_delivery_otp(Some("493021"), Some(now), Some("000000"), WINDOW, now),
            Err(ServiceError::InvalidOtp(_))
        );
    }

    #[test]
    fn otp_never_issued_is_rejected() {
        let now = Utc::now();
        assert_matches!(
            verify_delivery_otp(None, None, Some("493021"), WINDOW, now),
            Err(ServiceError::InvalidOtp(_))
        );
    }
}
