//! Cooperative cancellation of streaming passes.
//!
//! A `CancelSource` owns a generation counter. Every token records the
//! generation it was issued for and is cancelled as soon as the counter moves
//! on, so issuing a token for a new viewpoint cancels every older one at once.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Issues `CancelToken`s and supersedes them.
#[derive(Debug, Clone, Default)]
pub struct CancelSource {
    generation: Arc<AtomicU64>,
}

impl CancelSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token for the current generation.
    pub fn token(&self) -> CancelToken {
        CancelToken {
            generation: self.generation.clone(),
            issued: self.generation.load(Ordering::Acquire),
        }
    }

    /// Cancels every outstanding token and returns one for the new generation.
    pub fn supersede(&self) -> CancelToken {
        let issued = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        CancelToken {
            generation: self.generation.clone(),
            issued,
        }
    }

    /// The current generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

/// Checked by a streaming pass between chunks.
#[derive(Debug, Clone)]
pub struct CancelToken {
    generation: Arc<AtomicU64>,
    issued: u64,
}

impl CancelToken {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        CancelSource::new().token()
    }

    /// Whether a newer generation has been issued since this token.
    pub fn is_cancelled(&self) -> bool {
        self.generation.load(Ordering::Acquire) != self.issued
    }

    /// The generation this token was issued for.
    pub fn generation(&self) -> u64 {
        self.issued
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superseding_cancels_every_older_token() {
        let source = CancelSource::new();
        let first = source.token();
        let second = source.token();
        assert!(!first.is_cancelled());

        let third = source.supersede();
        assert!(first.is_cancelled());
        assert!(second.is_cancelled());
        assert!(!third.is_cancelled());
        assert_eq!(third.generation(), source.generation());

        let fourth = source.supersede();
        assert!(third.is_cancelled());
        assert!(!fourth.is_cancelled());
    }

    #[test]
    fn tokens_observe_other_threads() {
        let source = CancelSource::new();
        let token = source.token();
        let worker_source = source.clone();
        std::thread::spawn(move || {
            worker_source.supersede();
        })
        .join()
        .unwrap();
        assert!(token.is_cancelled());
    }
}
