//! Helper registry events - FACT EVENTS ONLY

use serde::Serialize;

use crate::domains::helpers::models::Helper;
use crate::kernel::stream_hub::topics;

/// Helper registry events
///
/// Lease changes made by the dispatcher are reported as booking events on the
/// helper's topic; these cover changes the helper's own client makes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HelperEvent {
    /// A helper joined the pool
    HelperRegistered { helper: Helper },

    /// Availability, location or skills changed
    HelperUpdated { helper: Helper },
}

impl HelperEvent {
    pub fn helper(&self) -> &Helper {
        match self {
            HelperEvent::HelperRegistered { helper } | HelperEvent::HelperUpdated { helper } => {
                helper
            }
        }
    }

    pub fn topics(&self) -> Vec<String> {
        vec![
            topics::HELPERS.to_string(),
            topics::helper(self.helper().id),
        ]
    }
}
