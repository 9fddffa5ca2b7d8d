//! Promo code redemption and administration.

use std::sync::Arc;

use tracing::info;

use crate::domain::ports::{PromoStore, PromoStoreError};
use crate::domain::{
    AccountId, Error, NewPromoCode, PromoCode, PromoCodeValue, PromoPolicy,
    PromoRedemptionOutcome,
};

/// Domain service over a [`PromoStore`].
#[derive(Clone)]
pub struct PromoService {
    store: Arc<dyn PromoStore>,
    price: u64,
    policy: PromoPolicy,
}

impl PromoService {
    /// Build the service; grants are `granted_generations * price`.
    pub fn new(store: Arc<dyn PromoStore>, price: u64, policy: PromoPolicy) -> Self {
        Self {
            store,
            price,
            policy,
        }
    }

    /// Redeem `raw_code` for `account_id`.
    ///
    /// Blank or over-long input is `Invalid` without touching storage.
    /// Redeeming the same code twice for one account yields `AlreadyUsed` and
    /// leaves the balance unchanged.
    pub async fn redeem(
        &self,
        account_id: AccountId,
        raw_code: &str,
    ) -> Result<PromoRedemptionOutcome, Error> {
        let Ok(code) = PromoCodeValue::parse(raw_code) else {
            return Ok(PromoRedemptionOutcome::Invalid);
        };
        let outcome = self
            .store
            .redeem(account_id, &code, self.price, self.policy)
            .await
            .map_err(map_promo_store_error)?;
        info!(account_id = %account_id, code = %code, outcome = ?outcome, "promo redemption");
        Ok(outcome)
    }

    /// Create a code.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` for blank, over-long, zero-grant, or zero-use input;
    /// `Conflict` when the normalised code already exists.
    pub async fn create(
        &self,
        raw_code: &str,
        granted_generations: u32,
        uses: u32,
    ) -> Result<PromoCode, Error> {
        let new_code = NewPromoCode::try_new(raw_code, granted_generations, uses)
            .map_err(|err| Error::invalid_request(err.to_string()))?;
        let created = self
            .store
            .create(&new_code)
            .await
            .map_err(map_promo_store_error)?;
        info!(promo_id = created.id, code = %created.code, "promo code created");
        Ok(created)
    }

    /// All codes, newest first.
    pub async fn list(&self) -> Result<Vec<PromoCode>, Error> {
        self.store.list().await.map_err(map_promo_store_error)
    }

    /// Look up a code by user-supplied text; invalid text finds nothing.
    pub async fn find_by_code(&self, raw_code: &str) -> Result<Option<PromoCode>, Error> {
        let Ok(code) = PromoCodeValue::parse(raw_code) else {
            return Ok(None);
        };
        self.store
            .find_by_code(&code)
            .await
            .map_err(map_promo_store_error)
    }

    /// Activate or deactivate a code.
    pub async fn set_active(&self, id: i64, is_active: bool) -> Result<PromoCode, Error> {
        self.store
            .set_active(id, is_active)
            .await
            .map_err(map_promo_store_error)?
            .ok_or_else(|| Error::not_found(format!("promo code {id} not found")))
    }

    /// Delete a code and its redemption history.
    pub async fn delete(&self, id: i64) -> Result<(), Error> {
        let deleted = self.store.delete(id).await.map_err(map_promo_store_error)?;
        if deleted {
            info!(promo_id = id, "promo code deleted");
            Ok(())
        } else {
            Err(Error::not_found(format!("promo code {id} not found")))
        }
    }
}

fn map_promo_store_error(error: PromoStoreError) -> Error {
    match error {
        PromoStoreError::Connection { message } => {
            Error::service_unavailable(format!("promo store unavailable: {message}"))
        }
        PromoStoreError::DuplicateCode { code } => {
            Error::conflict(format!("promo code {code} already exists"))
        }
        PromoStoreError::Query { message } | PromoStoreError::Corrupt { message } => {
            Error::internal(format!("promo store error: {message}"))
        }
    }
}

#[cfg(test)]
mod tests {
    //! Input handling and error mapping over a mocked store.

    use super::*;
    use crate::domain::ErrorCode;
    use crate::domain::ports::MockPromoStore;
    use chrono::{DateTime, Utc};
    use rstest::rstest;

    fn stored(code: &NewPromoCode) -> PromoCode {
        PromoCode {
            id: 4,
            code: code.code.clone(),
            granted_generations: code.granted_generations,
            remaining_uses: code.remaining_uses,
            is_active: true,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    fn service(store: MockPromoStore) -> PromoService {
        PromoService::new(Arc::new(store), 50, PromoPolicy::SingleUse)
    }

    #[rstest]
    #[case::blank("   ")]
    #[case::too_long(&"z".repeat(200))]
    #[tokio::test]
    async fn unparseable_codes_are_invalid_without_storage(#[case] raw: &str) {
        let mut store = MockPromoStore::new();
        store.expect_redeem().never();

        let outcome = service(store)
            .redeem(AccountId::new(1), raw)
            .await
            .expect("redeem runs");
        assert_eq!(outcome, PromoRedemptionOutcome::Invalid);
    }

    #[tokio::test]
    async fn redeem_passes_normalised_code_price_and_policy() {
        let mut store = MockPromoStore::new();
        store
            .expect_redeem()
            .withf(|account, code, price, policy| {
                *account == AccountId::new(8)
                    && code.as_ref() == "WELCOME"
                    && *price == 50
                    && *policy == PromoPolicy::SingleUse
            })
            .times(1)
            .returning(|_, _, _, _| {
                Ok(PromoRedemptionOutcome::Redeemed {
                    granted: 100,
                    generations: 2,
                })
            });

        let outcome = service(store)
            .redeem(AccountId::new(8), " welcome ")
            .await
            .expect("redeem runs");
        assert_eq!(
            outcome,
            PromoRedemptionOutcome::Redeemed {
                granted: 100,
                generations: 2
            }
        );
    }

    #[rstest]
    #[case::empty("", 1, 1)]
    #[case::zero_grant("FREE", 0, 1)]
    #[case::zero_uses("FREE", 1, 0)]
    #[tokio::test]
    async fn create_validates_input(#[case] raw: &str, #[case] generations: u32, #[case] uses: u32) {
        let mut store = MockPromoStore::new();
        store.expect_create().never();

        let error = service(store)
            .create(raw, generations, uses)
            .await
            .expect_err("invalid input");
        assert_eq!(error.code(), ErrorCode::InvalidRequest);
    }

    #[tokio::test]
    async fn create_maps_duplicates_to_conflict() {
        let mut store = MockPromoStore::new();
        store
            .expect_create()
            .returning(|code| Err(PromoStoreError::duplicate_code(code.code.to_string())));

        let error = service(store)
            .create("spring", 1, 10)
            .await
            .expect_err("duplicate");
        assert_eq!(error.code(), ErrorCode::Conflict);
    }

    #[tokio::test]
    async fn create_returns_stored_code() {
        let mut store = MockPromoStore::new();
        store.expect_create().returning(|code| Ok(stored(code)));

        let created = service(store)
            .create(" spring ", 3, 10)
            .await
            .expect("created");
        assert_eq!(created.code.as_ref(), "SPRING");
        assert_eq!(created.granted_generations, 3);
    }

    #[rstest]
    #[case::set_active(true)]
    #[case::delete(false)]
    #[tokio::test]
    async fn unknown_ids_are_not_found(#[case] toggle: bool) {
        let mut store = MockPromoStore::new();
        store.expect_set_active().returning(|_, _| Ok(None));
        store.expect_delete().returning(|_| Ok(false));
        let subject = service(store);

        let error = if toggle {
            subject.set_active(404, false).await.expect_err("missing")
        } else {
            subject.delete(404).await.expect_err("missing")
        };
        assert_eq!(error.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn find_by_code_skips_storage_for_blank_input() {
        let mut store = MockPromoStore::new();
        store.expect_find_by_code().never();

        assert!(service(store).find_by_code("  ").await.expect("runs").is_none());
    }

    #[tokio::test]
    async fn store_outage_is_unavailable() {
        let mut store = MockPromoStore::new();
        store
            .expect_list()
            .returning(|| Err(PromoStoreError::connection("refused")));

        let error = service(store).list().await.expect_err("down");
        assert_eq!(error.code(), ErrorCode::ServiceUnavailable);
    }
}
