//! Policy rules applied to the billing authority's raw purchase records.
//!
//! The asymmetry between recurring and one-time acknowledgment is
//! deliberate: the billing authority auto-acknowledges one-time purchases
//! asynchronously, so an unacknowledged one-time purchase is still valid,
//! while an unacknowledged recurring purchase is not (in deployments that
//! require acknowledgment).

use serde::Deserialize;

/// Payment actually received.
pub const PAYMENT_STATE_RECEIVED: i32 = 1;
/// Free trial; explicitly not a paid transaction.
pub const PAYMENT_STATE_FREE_TRIAL: i32 = 2;
/// One-time purchase completed.
pub const PURCHASE_STATE_PURCHASED: i32 = 0;
/// Purchase acknowledged by the application.
pub const ACKNOWLEDGED: i32 = 1;

/// Raw recurring-purchase record from the billing authority.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringRecord {
    /// Payment state (pending / received / free trial / deferred).
    #[serde(default)]
    pub payment_state: Option<i32>,

    /// Present only when the subscription was canceled.
    #[serde(default)]
    pub cancel_reason: Option<i32>,

    /// Whether the purchase was acknowledged.
    #[serde(default)]
    pub acknowledgement_state: Option<i32>,

    /// Expiry as epoch millis, serialized as a decimal string.
    #[serde(default)]
    pub expiry_time_millis: Option<String>,
}

/// Raw one-time-purchase record from the billing authority.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OneTimeRecord {
    /// Purchase state (purchased / canceled / pending).
    #[serde(default)]
    pub purchase_state: Option<i32>,

    /// Whether the purchase was acknowledged.
    #[serde(default)]
    pub acknowledgement_state: Option<i32>,
}

/// Whether a recurring purchase currently grants its entitlement.
pub fn recurring_is_active(
    record: &RecurringRecord,
    require_acknowledgment: bool,
    now_millis: i64,
) -> bool {
    // Actual paid transaction only; free trials are rejected outright.
    if record.payment_state != Some(PAYMENT_STATE_RECEIVED) {
        return false;
    }

    if record.cancel_reason.is_some() {
        return false;
    }

    if require_acknowledgment && record.acknowledgement_state != Some(ACKNOWLEDGED) {
        return false;
    }

    match expiry_millis(record) {
        Some(expiry) => expiry > now_millis,
        None => false,
    }
}

/// Whether a one-time purchase grants its entitlement.
///
/// Acknowledgment is not required synchronously; the authority may
/// auto-acknowledge after the fact.
pub fn one_time_is_active(record: &OneTimeRecord) -> bool {
    record.purchase_state == Some(PURCHASE_STATE_PURCHASED)
}

fn expiry_millis(record: &RecurringRecord) -> Option<i64> {
    record
        .expiry_time_millis
        .as_deref()
        .and_then(|s| s.parse::<i64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_750_000_000_000;

    fn paid_recurring() -> RecurringRecord {
        RecurringRecord {
            payment_state: Some(PAYMENT_STATE_RECEIVED),
            cancel_reason: None,
            acknowledgement_state: Some(ACKNOWLEDGED),
            expiry_time_millis: Some((NOW + 86_400_000).to_string()),
        }
    }

    #[test]
    fn paid_acknowledged_unexpired_recurring_is_active() {
        assert!(recurring_is_active(&paid_recurring(), true, NOW));
    }

    #[test]
    fn free_trial_rejected() {
        let mut record = paid_recurring();
        record.payment_state = Some(PAYMENT_STATE_FREE_TRIAL);
        assert!(!recurring_is_active(&record, true, NOW));
        assert!(!recurring_is_active(&record, false, NOW));
    }

    #[test]
    fn pending_payment_rejected() {
        let mut record = paid_recurring();
        record.payment_state = Some(0);
        assert!(!recurring_is_active(&record, true, NOW));
    }

    #[test]
    fn canceled_recurring_rejected() {
        let mut record = paid_recurring();
        record.cancel_reason = Some(0);
        assert!(!recurring_is_active(&record, true, NOW));
    }

    #[test]
    fn unacknowledged_recurring_rejected_when_required() {
        let mut record = paid_recurring();
        record.acknowledgement_state = Some(0);
        assert!(!recurring_is_active(&record, true, NOW));
        // Deployments not requiring acknowledgment accept it.
        assert!(recurring_is_active(&record, false, NOW));
    }

    #[test]
    fn expired_recurring_rejected() {
        let mut record = paid_recurring();
        record.expiry_time_millis = Some((NOW - 1).to_string());
        assert!(!recurring_is_active(&record, true, NOW));
    }

    #[test]
    fn missing_or_malformed_expiry_rejected() {
        let mut record = paid_recurring();
        record.expiry_time_millis = None;
        assert!(!recurring_is_active(&record, true, NOW));

        record.expiry_time_millis = Some("not-a-number".into());
        assert!(!recurring_is_active(&record, true, NOW));
    }

    #[test]
    fn purchased_one_time_is_active_even_unacknowledged() {
        let record = OneTimeRecord {
            purchase_state: Some(PURCHASE_STATE_PURCHASED),
            acknowledgement_state: Some(0),
        };
        assert!(one_time_is_active(&record));
    }

    #[test]
    fn canceled_or_pending_one_time_rejected() {
        for state in [Some(1), Some(2), None] {
            let record = OneTimeRecord {
                purchase_state: state,
                acknowledgement_state: Some(ACKNOWLEDGED),
            };
            assert!(!one_time_is_active(&record));
        }
    }

    #[test]
    fn records_parse_from_authority_json() {
        let json = r#"{
            "paymentState": 1,
            "acknowledgementState": 1,
            "expiryTimeMillis": "1750086400000",
            "orderId": "GPA.1234"
        }"#;
        let record: RecurringRecord = serde_json::from_str(json).unwrap();
        assert!(recurring_is_active(&record, true, NOW));
    }
}
