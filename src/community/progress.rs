use serde::Serialize;

use super::models::{Contributor, PaymentStatus};

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ContributionSummary {
    pub target_amount: f64,
    pub total_raised: f64,
    /// Rounded percentage of the target; may exceed 100.
    pub progress: u32,
    pub paid_count: usize,
    pub pending_count: usize,
    pub pending_amount: f64,
}

impl ContributionSummary {
    pub fn from_contributors(contributors: &[Contributor], target_amount: f64) -> Self {
        let mut summary = Self {
            target_amount,
            ..Self::default()
        };
        for c in contributors {
            match c.payment_status {
                PaymentStatus::Paid => {
                    summary.paid_count += 1;
                    summary.total_raised += c.settled_amount();
                }
                PaymentStatus::Pending => {
                    summary.pending_count += 1;
                    summary.pending_amount += c.amount;
                }
            }
        }
        summary.progress = progress_percent(summary.total_raised, target_amount);
        summary
    }
}

/// `round(raised / target * 100)`; 0 when the target is zero, negative or not finite.
pub fn progress_percent(raised: f64, target: f64) -> u32 {
    if !target.is_finite() || target <= 0.0 || !raised.is_finite() || raised <= 0.0 {
        return 0;
    }
    (raised / target * 100.0).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contributor(amount: f64, status: PaymentStatus) -> Contributor {
        Contributor {
            id: format!("c-{amount}"),
            active_event_id: "e1".into(),
            community_id: "k1".into(),
            member_id: None,
            parent_name: "Parent".into(),
            parent_email: None,
            parent_phone: None,
            parent_whatsapp: None,
            amount,
            payment_status: status,
            paid_amount: (status == PaymentStatus::Paid).then_some(amount),
            payment_method: None,
            payment_reference: None,
            payment_date: None,
            email_notified: false,
            email_notified_at: None,
            whatsapp_notified: false,
            whatsapp_notified_at: None,
        }
    }

    #[test]
    fn sums_only_paid_contributions() {
        let contributors = [
            contributor(1000.0, PaymentStatus::Paid),
            contributor(500.0, PaymentStatus::Pending),
        ];
        let summary = ContributionSummary::from_contributors(&contributors, 1500.0);
        assert_eq!(summary.total_raised, 1000.0);
        assert_eq!(summary.progress, 67);
        assert_eq!(summary.paid_count, 1);
        assert_eq!(summary.pending_count, 1);
        assert_eq!(summary.pending_amount, 500.0);
    }

    #[test]
    fn zero_target_is_zero_percent() {
        let contributors = [contributor(1000.0, PaymentStatus::Paid)];
        let summary = ContributionSummary::from_contributors(&contributors, 0.0);
        assert_eq!(summary.progress, 0);
        assert_eq!(progress_percent(10.0, f64::NAN), 0);
    }

    #[test]
    fn overfunded_events_exceed_one_hundred() {
        assert_eq!(progress_percent(1800.0, 1500.0), 120);
    }
}
