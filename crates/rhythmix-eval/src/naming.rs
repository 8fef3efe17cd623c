//! Collision-free names for hidden state variables.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counter producing `<base><split><n>` names.
///
/// Shared by reference (or `Arc`) between compilations; the atomic increment
/// is the only synchronisation needed.
#[derive(Debug)]
pub struct NameCounter {
    next: AtomicU64,
    split: char,
}

impl NameCounter {
    pub fn new(split: char) -> Self {
        NameCounter {
            next: AtomicU64::new(0),
            split,
        }
    }

    /// A fresh name for `base`, never returned before by this counter.
    pub fn fresh(&self, base: &str) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{base}{}{n}", self.split)
    }

    pub fn split_symbol(&self) -> char {
        self.split
    }

    /// Strip the counter suffix: `count$12` → `count`.
    pub fn base_of<'a>(&self, name: &'a str) -> &'a str {
        match name.rfind(self.split) {
            Some(i) if name[i + 1..].chars().all(|c| c.is_ascii_digit()) => &name[..i],
            _ => name,
        }
    }
}

impl Default for NameCounter {
    fn default() -> Self {
        NameCounter::new('$')
    }
}
