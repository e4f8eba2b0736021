//! Time Provider Port - Block Time Source
//!
//! The market reads block time through this trait but never advances it.
//! The simulation driver owns the clock and steps it between blocks.

use crate::domain::time::BlockTime;

/// Source of the current block timestamp, in seconds.
pub trait TimeProvider: Send + Sync {
    fn current_block_time(&self) -> u64;
}

impl TimeProvider for BlockTime {
    fn current_block_time(&self) -> u64 {
        self.time()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_shared_clock_observes_steps() {
        let clock = Arc::new(BlockTime::new(100, 12));
        let provider: Arc<dyn TimeProvider> = clock.clone();
        clock.step();
        assert_eq!(provider.current_block_time(), 112);
    }
}
