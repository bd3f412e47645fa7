use std::time::Duration;

use dashmap::{mapref::entry::Entry, DashMap};
use tokio::time::Instant;

/// Per-name cooldown clock for alerts.
///
/// A name may fire again once at least its cooldown has elapsed since its last
/// accepted firing. A blocked attempt does not move the clock.
#[derive(Debug, Default)]
pub struct CooldownGate {
    last_fired: DashMap<String, Instant>,
}

impl CooldownGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `name` when its cooldown has elapsed, stamping the clock.
    pub fn try_acquire(&self, name: &str, cooldown: Duration) -> bool {
        let now = Instant::now();
        match self.last_fired.entry(name.to_string()) {
            Entry::Occupied(mut last) => {
                if now.duration_since(*last.get()) < cooldown {
                    return false;
                }
                last.insert(now);
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        }
    }

    /// Time left before `name` may fire again.
    pub fn remaining(&self, name: &str, cooldown: Duration) -> Option<Duration> {
        let last = *self.last_fired.get(name)?;
        cooldown
            .checked_sub(Instant::now().duration_since(last))
            .filter(|left| !left.is_zero())
    }

    pub fn reset(&self, name: &str) {
        self.last_fired.remove(name);
    }

    pub fn clear(&self) {
        self.last_fired.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_blocks_until_cooldown_elapsed() {
        let gate = CooldownGate::new();
        let cooldown = Duration::from_secs(3);

        assert!(gate.try_acquire("follow", cooldown));
        assert!(!gate.try_acquire("follow", cooldown));
        assert!(gate.try_acquire("gift", cooldown));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!gate.try_acquire("follow", cooldown));
        assert_eq!(gate.remaining("follow", cooldown), Some(Duration::from_secs(1)));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(gate.try_acquire("follow", cooldown));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset() {
        let gate = CooldownGate::new();
        let cooldown = Duration::from_secs(60);
        assert!(gate.try_acquire("share", cooldown));
        gate.reset("share");
        assert!(gate.remaining("share", cooldown).is_none());
        assert!(gate.try_acquire("share", cooldown));
    }
}
