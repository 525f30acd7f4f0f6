//! Bulk blacklist pre-check
//!
//! Before row work, the batch's distinct emails are split into ones the
//! blacklist store already knows and unknown ones, which go to a pluggable
//! screening service in a single call. Newly flagged addresses are persisted
//! so later batches and sessions skip the external call for them. Screening
//! failures degrade to "nothing flagged"; per-row validation still applies.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::services::import::error::StoreError;
use crate::services::import::store::ImportStore;

/// Reason recorded for emails the store already knew
const KNOWN_BLACKLISTED_REASON: &str = "Email is blacklisted";

/// External screening mechanism. Returns a rejection reason for the subset
/// of submitted emails it rejects; absent entries passed.
#[async_trait]
pub trait BlacklistScreen: Send + Sync {
    async fn screen(&self, emails: &[String]) -> Result<HashMap<String, String>>;

    fn name(&self) -> &'static str;
}

/// Default screen: rejects nothing
pub struct NoScreening;

#[async_trait]
impl BlacklistScreen for NoScreening {
    async fn screen(&self, _emails: &[String]) -> Result<HashMap<String, String>> {
        Ok(HashMap::new())
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Run the pre-check for one batch. `emails` are the batch's distinct,
/// cleaned addresses. Returns email to rejection reason for every address the
/// row engine must short-circuit.
pub async fn precheck_batch(
    store: &mut dyn ImportStore,
    screen: &dyn BlacklistScreen,
    emails: &[String],
) -> Result<HashMap<String, String>, StoreError> {
    if emails.is_empty() {
        return Ok(HashMap::new());
    }

    let known = store.known_blacklisted(emails).await?;
    let mut flagged: HashMap<String, String> = known
        .into_iter()
        .map(|email| (email, KNOWN_BLACKLISTED_REASON.to_string()))
        .collect();

    let unknown: Vec<String> = emails
        .iter()
        .filter(|email| !flagged.contains_key(email.as_str()))
        .cloned()
        .collect();

    if !unknown.is_empty() {
        debug!(
            "Screening {} unknown emails via {}",
            unknown.len(),
            screen.name()
        );
        match screen.screen(&unknown).await {
            Ok(rejected) => {
                if !rejected.is_empty() {
                    let entries: Vec<(String, String)> = rejected
                        .iter()
                        .map(|(email, reason)| (email.clone(), reason.clone()))
                        .collect();
                    store.add_blacklist_entries(&entries).await?;
                    flagged.extend(rejected);
                }
            }
            Err(err) => {
                // Screening is an optimization; a failed call must not sink the batch
                warn!("Blacklist screening via {} failed: {}", screen.name(), err);
            }
        }
    }

    Ok(flagged)
}
