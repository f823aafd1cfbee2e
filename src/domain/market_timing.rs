//! Five-state machine turning a raw boolean stream into market-timing states.
//!
//! Starting from `NeutralHold`, a `true` input moves toward `Enter` /
//! `EnterHold` and a `false` input toward `Exit` / `ExitHold`. Only `Enter` and
//! `Exit` are acted on by the simulator; the hold states carry no event.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimingState {
    NeutralHold,
    Enter,
    EnterHold,
    Exit,
    ExitHold,
}

impl TimingState {
    pub const START: TimingState = TimingState::NeutralHold;

    pub fn transition(self, input: bool) -> TimingState {
        use TimingState::*;
        match (self, input) {
            (NeutralHold, true) => Enter,
            (NeutralHold, false) => NeutralHold,
            (Enter, true) => EnterHold,
            (Enter, false) => Exit,
            (EnterHold, true) => EnterHold,
            (EnterHold, false) => Exit,
            (Exit, true) => Enter,
            (Exit, false) => ExitHold,
            (ExitHold, true) => Enter,
            (ExitHold, false) => ExitHold,
        }
    }
}

/// One state per signal. The last signal is forced to `false` so that an
/// open position is always closed on the final index.
pub fn timing_states(signals: &[bool]) -> Vec<TimingState> {
    let last = signals.len().saturating_sub(1);
    let mut state = TimingState::START;
    signals
        .iter()
        .enumerate()
        .map(|(i, &signal)| {
            state = state.transition(signal && i != last);
            state
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::TimingState::*;
    use super::*;

    #[test]
    fn transition_table() {
        let cases = [
            (NeutralHold, true, Enter),
            (NeutralHold, false, NeutralHold),
            (Enter, true, EnterHold),
            (Enter, false, Exit),
            (EnterHold, true, EnterHold),
            (EnterHold, false, Exit),
            (Exit, true, Enter),
            (Exit, false, ExitHold),
            (ExitHold, true, Enter),
            (ExitHold, false, ExitHold),
        ];
        for (from, input, to) in cases {
            assert_eq!(from.transition(input), to, "{from:?} on {input}");
        }
    }

    #[test]
    fn two_point_series_enters_then_exits() {
        assert_eq!(timing_states(&[true, false]), vec![Enter, Exit]);
    }

    #[test]
    fn last_signal_forced_false() {
        assert_eq!(timing_states(&[true, true]), vec![Enter, Exit]);
        assert_eq!(timing_states(&[true]), vec![NeutralHold]);
    }

    #[test]
    fn holds_and_reentry() {
        let states = timing_states(&[false, true, true, false, false, true, true, true]);
        assert_eq!(
            states,
            vec![NeutralHold, Enter, EnterHold, Exit, ExitHold, Enter, EnterHold, Exit]
        );
    }

    #[test]
    fn empty_input() {
        assert!(timing_states(&[]).is_empty());
    }
}
