//! Leg-Damage Index tracking. Each leg kick landed on a fighter raises that
//! fighter's accumulated index, so the opponent's NEXT leg kick scores with a
//! higher multiplier. Reset per round.

use combat_types::Corner;

use super::profile::ScoringProfile;

pub struct LegDamageTracker {
    red_received: f64,
    blue_received: f64,
}

impl LegDamageTracker {
    pub fn new() -> Self {
        Self {
            red_received: 0.0,
            blue_received: 0.0,
        }
    }

    pub fn index_for(&self, target: Corner) -> f64 {
        match target {
            Corner::Red => self.red_received,
            Corner::Blue => self.blue_received,
        }
    }

    /// Record a landed leg kick by `attacker` and return the multiplier that
    /// applies to THIS kick (read before increment).
    pub fn record_leg_kick(&mut self, attacker: Corner, profile: &ScoringProfile) -> f64 {
        let target = attacker.opponent();
        let multiplier = profile.ldi_multiplier(self.index_for(target));
        match target {
            Corner::Red => self.red_received += profile.ldi_increment,
            Corner::Blue => self.blue_received += profile.ldi_increment,
        }
        multiplier
    }
}

impl Default for LegDamageTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalation_steps_through_brackets() {
        let profile = ScoringProfile::default();
        let mut tracker = LegDamageTracker::new();

        // First three kicks stay in the 1.00 bracket (index 0.0, 0.1, 0.2)
        for _ in 0..3 {
            assert!((tracker.record_leg_kick(Corner::Red, &profile) - 1.00).abs() < f64::EPSILON);
        }
        // Index now ~0.3: next bracket
        let fourth = tracker.record_leg_kick(Corner::Red, &profile);
        assert!((fourth - 1.10).abs() < 1e-9);
        assert!(tracker.index_for(Corner::Blue) > 0.39);
        // Red's own index is untouched
        assert!((tracker.index_for(Corner::Red)).abs() < f64::EPSILON);
    }

    #[test]
    fn trackers_are_per_target() {
        let profile = ScoringProfile::default();
        let mut tracker = LegDamageTracker::new();
        tracker.record_leg_kick(Corner::Red, &profile);
        tracker.record_leg_kick(Corner::Blue, &profile);
        assert!((tracker.index_for(Corner::Red) - 0.1).abs() < 1e-9);
        assert!((tracker.index_for(Corner::Blue) - 0.1).abs() < 1e-9);
    }
}
