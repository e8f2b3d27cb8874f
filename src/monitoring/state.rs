use crate::db::models::MonitorState;

/// Thresholds resolved per monitor (monitor override when > 0, otherwise the
/// settings value).
#[derive(Debug, Clone, Copy)]
pub struct StateParams {
    /// Consecutive contrary probes required to flip a confirmed state.
    pub flap_threshold: i32,
    /// Probes required to enter the first confirmed state from unknown.
    pub stabilize_count: i32,
}

/// A confirmed state change. Emitted at most once per probe, never for the
/// first confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition {
    pub to_online: bool,
}

/// Feeds one probe into the per-monitor streak machine.
///
/// Streaks are updated first (the opposite streak always resets to zero),
/// then the confirmed state is re-evaluated: an unknown monitor confirms
/// silently once the stabilize count is met, a confirmed monitor flips and
/// emits a transition once the contrary streak reaches the flap threshold.
pub fn apply_probe(
    state: &mut MonitorState,
    online: bool,
    params: &StateParams,
) -> Option<StatusTransition> {
    if online {
        state.online_streak += 1;
        state.offline_streak = 0;
    } else {
        state.offline_streak += 1;
        state.online_streak = 0;
    }

    let flap = params.flap_threshold.max(1);
    let stabilize = params.stabilize_count.max(0);

    match state.last_reported_online {
        None => {
            if stabilize <= 1 {
                state.last_reported_online = Some(online);
            } else if online && state.online_streak >= stabilize {
                state.last_reported_online = Some(true);
            } else if !online && state.offline_streak >= stabilize {
                state.last_reported_online = Some(false);
            }
            None
        }
        Some(reported) if reported != online => {
            if online && state.online_streak >= flap {
                state.last_reported_online = Some(true);
                Some(StatusTransition { to_online: true })
            } else if !online && state.offline_streak >= flap {
                state.last_reported_online = Some(false);
                Some(StatusTransition { to_online: false })
            } else {
                None
            }
        }
        Some(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh(id: i64) -> MonitorState {
        MonitorState {
            monitor_id: id,
            last_reported_online: None,
            online_streak: 0,
            offline_streak: 0,
        }
    }

    fn run(probes: &[bool], params: &StateParams) -> (MonitorState, Vec<StatusTransition>) {
        let mut state = fresh(1);
        let mut transitions = Vec::new();
        for &online in probes {
            if let Some(t) = apply_probe(&mut state, online, params) {
                transitions.push(t);
            }
            assert!(
                state.online_streak == 0 || state.offline_streak == 0,
                "one streak must always be zero"
            );
        }
        (state, transitions)
    }

    const DEFAULTS: StateParams = StateParams {
        flap_threshold: 2,
        stabilize_count: 1,
    };

    #[test]
    fn first_probe_confirms_without_transition() {
        let (state, transitions) = run(&[true], &DEFAULTS);
        assert_eq!(state.last_reported_online, Some(true));
        assert!(transitions.is_empty());
    }

    #[test]
    fn flap_below_threshold_is_suppressed() {
        // up, up, down, up, down, down with flap_threshold = 2:
        // the single intermediate down must not flip, the final down pair must.
        let (state, transitions) = run(&[true, true, false, true, false, false], &DEFAULTS);
        assert_eq!(transitions, vec![StatusTransition { to_online: false }]);
        assert_eq!(state.last_reported_online, Some(false));
        assert_eq!(state.offline_streak, 2);
    }

    #[test]
    fn transitions_alternate_directions() {
        let probes = [true, false, false, true, true, false, false, true, true];
        let (_, transitions) = run(&probes, &DEFAULTS);
        assert!(!transitions.is_empty());
        for pair in transitions.windows(2) {
            assert_ne!(pair[0].to_online, pair[1].to_online);
        }
    }

    #[test]
    fn offline_start_then_recovery_emits_both_directions() {
        let (_, transitions) = run(&[false, true, true], &DEFAULTS);
        assert_eq!(transitions, vec![StatusTransition { to_online: true }]);
    }

    #[test]
    fn agreement_never_emits() {
        let (_, transitions) = run(&[true; 20], &DEFAULTS);
        assert!(transitions.is_empty());
    }

    #[test]
    fn stabilize_count_delays_first_confirmation() {
        let params = StateParams {
            flap_threshold: 2,
            stabilize_count: 3,
        };
        let mut state = fresh(1);
        assert_eq!(apply_probe(&mut state, true, &params), None);
        assert_eq!(state.last_reported_online, None);
        assert_eq!(apply_probe(&mut state, true, &params), None);
        assert_eq!(state.last_reported_online, None);
        assert_eq!(apply_probe(&mut state, true, &params), None);
        assert_eq!(state.last_reported_online, Some(true));
    }

    #[test]
    fn forever_flapping_monitor_never_confirms_under_stabilize() {
        let params = StateParams {
            flap_threshold: 2,
            stabilize_count: 2,
        };
        let probes: Vec<bool> = (0..50).map(|i| i % 2 == 0).collect();
        let (state, transitions) = run(&probes, &params);
        assert_eq!(state.last_reported_online, None);
        assert!(transitions.is_empty());
    }

    #[test]
    fn higher_flap_threshold_needs_longer_contrary_run() {
        let params = StateParams {
            flap_threshold: 3,
            stabilize_count: 1,
        };
        let (_, transitions) = run(&[true, false, false], &params);
        assert!(transitions.is_empty());
        let (_, transitions) = run(&[true, false, false, false], &params);
        assert_eq!(transitions, vec![StatusTransition { to_online: false }]);
    }

    #[test]
    fn transition_direction_matches_new_state() {
        let mut state = fresh(1);
        apply_probe(&mut state, true, &DEFAULTS);
        apply_probe(&mut state, false, &DEFAULTS);
        let t = apply_probe(&mut state, false, &DEFAULTS).expect("flip expected");
        assert!(!t.to_online);
        assert_eq!(state.last_reported_online, Some(false));
    }
}
