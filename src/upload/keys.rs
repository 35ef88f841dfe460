//! Object key derivation

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide key counter
///
/// Shared by every upload in the process so concurrent requests never
/// derive the same object key.
#[derive(Debug, Default)]
pub struct KeySequence {
    counter: AtomicU64,
}

impl KeySequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next value, starting at 1
    pub fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// `<base><n>` with the next counter value
    pub fn derive(&self, base: &str) -> String {
        format!("{}{}", base, self.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_starts_at_one() {
        let keys = KeySequence::new();
        assert_eq!(keys.derive("file"), "file1");
        assert_eq!(keys.derive("file"), "file2");
    }

    #[test]
    fn test_unique_across_threads() {
        let keys = Arc::new(KeySequence::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let keys = Arc::clone(&keys);
                std::thread::spawn(move || (0..100).map(|_| keys.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for value in handle.join().unwrap() {
                assert!(seen.insert(value), "duplicate key suffix {}", value);
            }
        }
        assert_eq!(seen.len(), 800);
    }
}
