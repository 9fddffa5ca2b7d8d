//! Billable account model and the pure spend/adjust arithmetic.
//!
//! Storage adapters lock an account row, load it into [`Account`], ask
//! [`Account::plan_spend`] what to charge, and write the result back inside the
//! same transaction. Keeping the decision here means every adapter applies the
//! same "one credit first, else balance" rule.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable external account identifier (for example a chat user id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(i64);

impl AccountId {
    /// Wrap a raw identifier.
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Access the raw identifier.
    pub const fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for AccountId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Snapshot of an account's spendable state.
///
/// ## Invariants
/// - `credits` and `balance` are never negative; the unsigned types enforce it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account identity.
    pub id: AccountId,
    /// Pre-paid generations, consumed before balance.
    pub credits: u32,
    /// Cash-equivalent balance in minor units.
    pub balance: u64,
    /// Administrative accounts are never charged.
    pub is_admin: bool,
}

impl Account {
    /// Build an empty, non-admin account.
    pub const fn empty(id: AccountId) -> Self {
        Self {
            id,
            credits: 0,
            balance: 0,
            is_admin: false,
        }
    }

    /// Decide what one generation at `price` costs this account.
    ///
    /// Returns `None` when the account can pay neither with a credit nor with
    /// balance. Never clamps.
    ///
    /// # Examples
    /// ```
    /// use photoshoot_backend::domain::{Account, AccountId, Charge};
    ///
    /// let mut account = Account::empty(AccountId::new(7));
    /// account.balance = 100;
    /// assert_eq!(account.plan_spend(50), Some(Charge::Balance { amount: 50 }));
    /// account.credits = 1;
    /// assert_eq!(account.plan_spend(50), Some(Charge::Credit));
    /// ```
    pub fn plan_spend(&self, price: u64) -> Option<Charge> {
        if self.credits > 0 {
            Some(Charge::Credit)
        } else if self.balance >= price {
            Some(Charge::Balance { amount: price })
        } else {
            None
        }
    }

    /// Return the account state after `charge` has been applied.
    ///
    /// Callers must obtain `charge` from [`Account::plan_spend`] on the same
    /// snapshot; arithmetic saturates rather than wrapping.
    #[must_use]
    pub fn after_charge(&self, charge: Charge) -> Self {
        let mut next = self.clone();
        match charge {
            Charge::Waived => {}
            Charge::Credit => next.credits = next.credits.saturating_sub(1),
            Charge::Balance { amount } => next.balance = next.balance.saturating_sub(amount),
        }
        next
    }

    /// Apply an administrative credit adjustment, clamping at zero.
    #[must_use]
    pub fn with_credit_delta(&self, delta: i64) -> Self {
        let mut next = self.clone();
        let adjusted = clamp_apply(u64::from(self.credits), delta);
        next.credits = u32::try_from(adjusted).unwrap_or(u32::MAX);
        next
    }

    /// Apply an administrative balance adjustment, clamping at zero.
    #[must_use]
    pub fn with_balance_delta(&self, delta: i64) -> Self {
        let mut next = self.clone();
        next.balance = clamp_apply(self.balance, delta);
        next
    }
}

/// What a successful settlement took from an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Charge {
    /// Administrative account; nothing was taken.
    Waived,
    /// One pre-paid credit was consumed.
    Credit,
    /// Balance was reduced by `amount`.
    Balance {
        /// Minor units deducted.
        amount: u64,
    },
}

impl Charge {
    /// Balance minor units deducted by this charge.
    pub const fn amount(self) -> u64 {
        match self {
            Self::Balance { amount } => amount,
            Self::Waived | Self::Credit => 0,
        }
    }

    /// Credits consumed by this charge.
    pub const fn credits(self) -> u32 {
        match self {
            Self::Credit => 1,
            Self::Waived | Self::Balance { .. } => 0,
        }
    }
}

/// Result of the atomic spend primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpendDecision {
    /// Funds were taken.
    Charged(Charge),
    /// Neither credits nor balance sufficed; nothing changed.
    Declined,
}

impl SpendDecision {
    /// Whether the spend went through.
    pub const fn is_charged(self) -> bool {
        matches!(self, Self::Charged(_))
    }
}

fn clamp_apply(current: u64, delta: i64) -> u64 {
    if delta >= 0 {
        current.saturating_add(delta.unsigned_abs())
    } else {
        current.saturating_sub(delta.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    //! Coverage for spend planning and administrative clamping.

    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn account() -> Account {
        Account::empty(AccountId::new(42))
    }

    #[rstest]
    #[case::credit_first(1, 500, Some(Charge::Credit))]
    #[case::balance_exact(0, 50, Some(Charge::Balance { amount: 50 }))]
    #[case::balance_surplus(0, 100, Some(Charge::Balance { amount: 50 }))]
    #[case::insufficient(0, 49, None)]
    fn plan_spend_prefers_credits(
        mut account: Account,
        #[case] credits: u32,
        #[case] balance: u64,
        #[case] expected: Option<Charge>,
    ) {
        account.credits = credits;
        account.balance = balance;
        assert_eq!(account.plan_spend(50), expected);
    }

    #[rstest]
    fn after_charge_decrements_the_charged_resource(mut account: Account) {
        account.credits = 2;
        account.balance = 100;

        let after_credit = account.after_charge(Charge::Credit);
        assert_eq!((after_credit.credits, after_credit.balance), (1, 100));

        let after_balance = account.after_charge(Charge::Balance { amount: 30 });
        assert_eq!((after_balance.credits, after_balance.balance), (2, 70));

        assert_eq!(account.after_charge(Charge::Waived), account);
    }

    #[rstest]
    #[case::add(5, 3, 8)]
    #[case::subtract(5, -3, 2)]
    #[case::clamp(5, -30, 0)]
    fn credit_adjustments_clamp_at_zero(
        mut account: Account,
        #[case] start: u32,
        #[case] delta: i64,
        #[case] expected: u32,
    ) {
        account.credits = start;
        assert_eq!(account.with_credit_delta(delta).credits, expected);
    }

    #[rstest]
    fn balance_adjustments_clamp_at_zero(mut account: Account) {
        account.balance = 40;
        assert_eq!(account.with_balance_delta(-100).balance, 0);
        assert_eq!(account.with_balance_delta(i64::MIN).balance, 0);
        assert_eq!(account.with_balance_delta(60).balance, 100);
    }

    #[rstest]
    fn charge_amounts_report_what_was_taken() {
        assert_eq!(Charge::Credit.credits(), 1);
        assert_eq!(Charge::Credit.amount(), 0);
        assert_eq!(Charge::Balance { amount: 50 }.amount(), 50);
        assert_eq!(Charge::Waived.amount(), 0);
        assert!(SpendDecision::Charged(Charge::Credit).is_charged());
        assert!(!SpendDecision::Declined.is_charged());
    }
}
