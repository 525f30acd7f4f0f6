//! Subscriber quota enforcement
//!
//! Two ceilings apply to every import: the owning account's total subscriber
//! cap and the target list's cap, -1 meaning unlimited. Counters are seeded
//! once per batch from distinct-email counts and advance only when a new
//! subscriber is created. Updates never consume quota.

use crate::services::import::error::StoreError;
use crate::services::import::store::ImportStore;
use crate::types::ListContext;

/// Which ceiling was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaCap {
    Account,
    List,
}

impl QuotaCap {
    /// Wording returned to the client when imports halt on this cap
    pub fn message(&self) -> &'static str {
        match self {
            QuotaCap::Account => "Maximum number of subscribers for the account has been reached",
            QuotaCap::List => "Maximum number of subscribers for this list has been reached",
        }
    }
}

/// Per-batch quota state
#[derive(Debug)]
pub struct QuotaGuard {
    account_cap: i64,
    list_cap: i64,
    account_count: i64,
    list_count: i64,
}

impl QuotaGuard {
    /// Seed counters from the store at batch start
    pub async fn seed(
        store: &mut dyn ImportStore,
        context: &ListContext,
    ) -> Result<Self, StoreError> {
        let account_count = store.count_account_subscribers(context.customer_id).await?;
        let list_count = store.count_list_subscribers(context.list_id).await?;
        Ok(Self::with_counts(context, account_count, list_count))
    }

    pub fn with_counts(context: &ListContext, account_count: i64, list_count: i64) -> Self {
        Self {
            account_cap: context.max_subscribers_per_account,
            list_cap: context.max_subscribers_per_list,
            account_count,
            list_count,
        }
    }

    fn account_full(&self) -> bool {
        self.account_cap >= 0 && self.account_count >= self.account_cap
    }

    fn list_full(&self) -> bool {
        self.list_cap >= 0 && self.list_count >= self.list_cap
    }

    /// Cap already met before any row work; the whole batch is rejected
    pub fn at_capacity(&self) -> Option<QuotaCap> {
        if self.account_full() {
            Some(QuotaCap::Account)
        } else if self.list_full() {
            Some(QuotaCap::List)
        } else {
            None
        }
    }

    /// Account a newly created subscriber. Returns the cap that was just
    /// reached, which halts the batch mid-page.
    pub fn record_created(&mut self) -> Option<QuotaCap> {
        self.account_count += 1;
        self.list_count += 1;
        self.at_capacity()
    }
}
