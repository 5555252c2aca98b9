//! Bounds the number of screenshots kept in tool results.

use proto::{ConversationHistory, ResultPart};

/// How many tool-result images to keep, and the batch size for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionBudget {
    pub keep: usize,
    /// Images are removed in multiples of this; `0` behaves like `1`.
    pub granularity: usize,
}

impl Default for RetentionBudget {
    fn default() -> Self {
        Self {
            keep: 10,
            granularity: 10,
        }
    }
}

impl RetentionBudget {
    /// Number of images a trim pass removes from a history holding `total`.
    pub fn excess(&self, total: usize) -> usize {
        if total <= self.keep {
            return 0;
        }
        let granularity = self.granularity.max(1);
        let excess = total - self.keep;
        excess - excess % granularity
    }
}

/// Removes the oldest tool-result images beyond the budget, in history order.
///
/// Text parts are left in place. Returns the number of images removed.
pub fn trim_images(history: &mut ConversationHistory, budget: RetentionBudget) -> usize {
    let mut remaining = budget.excess(history.image_count());
    if remaining == 0 {
        return 0;
    }

    let mut removed = 0;
    for parts in history.tool_results_mut() {
        parts.retain(|part| {
            if remaining > 0 && matches!(part, ResultPart::Image { .. }) {
                remaining -= 1;
                removed += 1;
                false
            } else {
                true
            }
        });
        if remaining == 0 {
            break;
        }
    }
    removed
}
