//! Batch transform hooks
//!
//! An ordered list of callbacks gets a mutable view of the batch right after
//! the source read, before schema resolution. A transform may rewrite
//! records, append log entries or mark the batch finished, which stops both
//! the remaining transforms and the row engine.

use std::sync::Arc;

use tracing::debug;

use crate::services::import::source::RawRecord;
use crate::types::ImportLogEntry;

/// Mutable batch state handed to each transform
#[derive(Debug, Default)]
pub struct BatchContext {
    pub records: Vec<RawRecord>,
    pub log: Vec<ImportLogEntry>,
    pub finished: bool,
}

impl BatchContext {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self {
            records,
            log: Vec::new(),
            finished: false,
        }
    }
}

/// A single registered batch transform
pub trait BatchTransform: Send + Sync {
    fn name(&self) -> &'static str;
    fn apply(&self, context: &mut BatchContext);
}

/// Run transforms in registration order, stopping once one marks the batch
/// finished.
pub fn apply_transforms(transforms: &[Arc<dyn BatchTransform>], context: &mut BatchContext) {
    for transform in transforms {
        debug!("Applying batch transform: {}", transform.name());
        transform.apply(context);
        if context.finished {
            debug!("Batch transform {} marked the batch finished", transform.name());
            break;
        }
    }
}
