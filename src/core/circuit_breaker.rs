//! Circuit breaker to prevent infinite stop-denial loops.
//!
//! An agent that keeps being refused at `Stop` can loop forever. After
//! `max_stop_denials` refusals a gate trips and its later stop refusals are
//! downgraded to warnings. Explicit hard blocks are unaffected.

use crate::core::state::GateState;
use tracing::warn;

/// Metadata key counting stop denials.
pub const STOP_DENIALS: &str = "stop_denials";

/// Metadata key set once the breaker trips.
pub const TRIPPED: &str = "circuit_breaker_tripped";

/// Whether the breaker has already tripped for this gate.
#[must_use]
pub fn is_tripped(gate: &GateState) -> bool {
    gate.flag(TRIPPED)
}

/// Record one stop denial and trip the breaker if the limit is reached.
///
/// Returns `true` if this denial tripped the breaker.
pub fn record_denial(gate: &mut GateState, gate_name: &str, max: u32) -> bool {
    let count = gate.bump_counter(STOP_DENIALS);
    if count < u64::from(max) {
        return false;
    }
    trip(gate, gate_name, count);
    true
}

/// Trip the breaker.
fn trip(gate: &mut GateState, gate_name: &str, count: u64) {
    gate.metadata
        .insert(TRIPPED.to_string(), serde_json::Value::Bool(true));
    warn!(
        gate = gate_name,
        denials = count,
        "Circuit breaker tripped; further stop denials become warnings"
    );
}

/// Reset the breaker, e.g. after the gate's condition is satisfied.
pub fn reset(gate: &mut GateState) {
    gate.metadata.remove(STOP_DENIALS);
    gate.metadata.remove(TRIPPED);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::GateStatus;

    #[test]
    fn below_limit_does_not_trip() {
        let mut gate = GateState::new(GateStatus::Closed);
        assert!(!record_denial(&mut gate, "qa", 3));
        assert!(!record_denial(&mut gate, "qa", 3));
        assert!(!is_tripped(&gate));
        assert_eq!(gate.counter(STOP_DENIALS), 2);
    }

    #[test]
    fn trips_at_limit() {
        let mut gate = GateState::new(GateStatus::Closed);
        record_denial(&mut gate, "qa", 3);
        record_denial(&mut gate, "qa", 3);
        assert!(record_denial(&mut gate, "qa", 3));
        assert!(is_tripped(&gate));
    }

    #[test]
    fn limit_of_one_trips_immediately() {
        let mut gate = GateState::new(GateStatus::Closed);
        assert!(record_denial(&mut gate, "handover", 1));
    }

    #[test]
    fn reset_clears_state() {
        let mut gate = GateState::new(GateStatus::Closed);
        record_denial(&mut gate, "qa", 1);
        reset(&mut gate);
        assert!(!is_tripped(&gate));
        assert_eq!(gate.counter(STOP_DENIALS), 0);
    }
}
