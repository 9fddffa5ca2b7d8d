//! Port abstraction for promo code inventory and redemption.

use async_trait::async_trait;

use crate::domain::{
    AccountId, NewPromoCode, PromoCode, PromoCodeValue, PromoPolicy, PromoRedemptionOutcome,
};

use super::define_port_error;

define_port_error! {
    /// Errors raised by promo store adapters.
    pub enum PromoStoreError {
        /// Store connection could not be established.
        Connection { message: String } => "promo store connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "promo store query failed: {message}",
        /// A code with the same normalised text already exists.
        DuplicateCode { code: String } => "promo code already exists: {code}",
        /// A stored row violated a domain invariant.
        Corrupt { message: String } => "promo store returned invalid data: {message}",
    }
}

/// Port for promo code storage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PromoStore: Send + Sync {
    /// Redeem `code` for `account_id` in one transaction.
    ///
    /// Locks the code row before the account row. Returns
    /// [`PromoRedemptionOutcome::Invalid`] for unknown codes,
    /// [`PromoRedemptionOutcome::AlreadyUsed`] when a redemption for the pair
    /// exists (checked before the active flag), and `Invalid` for inactive or
    /// exhausted codes. On success the account balance grows by
    /// `granted_generations * price`, a redemption row is inserted, and the
    /// code is updated per `policy`. A uniqueness violation on the redemption
    /// insert is reported as `AlreadyUsed`.
    async fn redeem(
        &self,
        account_id: AccountId,
        code: &PromoCodeValue,
        price: u64,
        policy: PromoPolicy,
    ) -> Result<PromoRedemptionOutcome, PromoStoreError>;

    /// Create a code; fails with [`PromoStoreError::DuplicateCode`] on clash.
    async fn create(&self, code: &NewPromoCode) -> Result<PromoCode, PromoStoreError>;

    /// List all codes, newest first.
    async fn list(&self) -> Result<Vec<PromoCode>, PromoStoreError>;

    /// Look a code up by normalised text.
    async fn find_by_code(
        &self,
        code: &PromoCodeValue,
    ) -> Result<Option<PromoCode>, PromoStoreError>;

    /// Toggle the active flag; `None` when the id is unknown.
    async fn set_active(
        &self,
        id: i64,
        is_active: bool,
    ) -> Result<Option<PromoCode>, PromoStoreError>;

    /// Delete a code and its redemptions; `false` when the id is unknown.
    async fn delete(&self, id: i64) -> Result<bool, PromoStoreError>;
}
