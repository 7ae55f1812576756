//! Work items flowing through block queues.

use std::fmt;

/// An item buffered in a block's input queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// Delivered by the scenario injector.
    Stimulus {
        /// Ordinal among the stimuli offered to the target block, from 1.
        seq: u64,
        /// Signal label of the stimulus.
        signal_type: String,
        /// Opaque payload from the scenario.
        value: serde_json::Value,
    },
    /// Output of an upstream block.
    Forwarded {
        /// Upstream block-local sequence number of the completed item.
        seq: u64,
        /// Upstream block id.
        source: String,
    },
}

impl Item {
    /// Producer-assigned sequence number: the stimulus ordinal for the
    /// target block, or the upstream block's item number.
    pub fn seq(&self) -> u64 {
        match self {
            Item::Stimulus { seq, .. } | Item::Forwarded { seq, .. } => *seq,
        }
    }

    /// Short category name, `"stimulus"` or `"forwarded"`.
    pub fn kind(&self) -> &'static str {
        match self {
            Item::Stimulus { .. } => "stimulus",
            Item::Forwarded { .. } => "forwarded",
        }
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Stimulus { signal_type, .. } => write!(f, "stimulus({signal_type})"),
            Item::Forwarded { seq, source } => write!(f, "{source}#{seq}"),
        }
    }
}
