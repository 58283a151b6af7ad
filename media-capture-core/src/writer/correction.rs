//! Pause-gap removal for one track.

use crate::models::state::WriterTrackState;
use crate::models::time::TimeBase;

/// Output time for a frame captured at `raw` on the track described by
/// `state`. `other` is the opposite track of the same container.
///
/// A pending correction is resolved here, on the track's first frame after
/// a pause: the new correction is whatever maps `raw` onto the end of the
/// last written frame, so the output continues without a gap. A track with
/// nothing written yet follows the other track instead: its settled
/// correction if it has one, else the offset that maps `raw` onto the
/// other track's end. The correction only ever grows.
///
/// A corrected time that would be negative or run backwards on the track
/// falls back to the uncorrected `raw`, and finally to the previous
/// presentation time. `state` is not advanced; the caller records the
/// written frame.
pub(crate) fn corrected_time(state: &mut WriterTrackState, other: &WriterTrackState, raw: TimeBase) -> TimeBase {
    if state.pending_correction_update {
        state.pending_correction_update = false;
        let candidate = match (state.last_emitted_time, other.last_emitted_time) {
            (Some(last_end), _) => Some(raw - last_end),
            (None, Some(_)) if !other.pending_correction_update => Some(other.pause_correction),
            (None, Some(other_end)) => Some(raw - other_end),
            (None, None) => None,
        };
        if let Some(candidate) = candidate {
            if candidate > state.pause_correction {
                log::debug!("pause correction {} -> {}", state.pause_correction, candidate);
                state.pause_correction = candidate;
            }
        }
    }

    let corrected = raw - state.pause_correction;
    let Some(previous) = state.last_presentation_time else {
        return if corrected.is_negative() { raw } else { corrected };
    };
    if corrected >= previous && !corrected.is_negative() {
        return corrected;
    }

    log::warn!("corrected time {} behind {}, correction skipped for this frame", corrected, previous);
    raw.max(previous)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: i64) -> TimeBase {
        TimeBase::from_seconds(s)
    }

    fn after_write(state: &mut WriterTrackState, pts: TimeBase, duration: TimeBase) {
        state.last_presentation_time = Some(pts);
        state.last_emitted_time = Some(pts + duration);
    }

    fn idle() -> WriterTrackState {
        WriterTrackState::new()
    }

    #[test]
    fn no_pause_passes_through() {
        let mut state = WriterTrackState::new();
        assert_eq!(corrected_time(&mut state, &idle(), secs(3)), secs(3));
    }

    #[test]
    fn pending_update_with_no_history_anywhere_just_clears() {
        let mut state = WriterTrackState::new();
        state.pending_correction_update = true;
        assert_eq!(corrected_time(&mut state, &idle(), secs(4)), secs(4));
        assert!(!state.pending_correction_update);
        assert!(state.pause_correction.is_zero());
    }

    #[test]
    fn empty_track_adopts_settled_correction_of_other_track() {
        let mut other = WriterTrackState::new();
        after_write(&mut other, secs(2), secs(1));
        other.pause_correction = secs(7);

        let mut state = WriterTrackState::new();
        state.pending_correction_update = true;
        assert_eq!(corrected_time(&mut state, &other, secs(10)), secs(3));
        assert_eq!(state.pause_correction, secs(7));
        assert!(!state.pending_correction_update);
    }

    #[test]
    fn empty_track_ahead_of_other_track_lands_on_its_end() {
        // The other track has not seen a frame since the pause either.
        let mut other = WriterTrackState::new();
        after_write(&mut other, secs(1), secs(1));
        other.pending_correction_update = true;

        let mut state = WriterTrackState::new();
        state.pending_correction_update = true;
        assert_eq!(corrected_time(&mut state, &other, secs(10)), secs(2));
        assert_eq!(state.pause_correction, secs(8));
    }

    #[test]
    fn resume_lands_on_previous_end() {
        let mut state = WriterTrackState::new();
        after_write(&mut state, TimeBase::new(1, 30), TimeBase::new(1, 30));
        state.pending_correction_update = true;

        let t = corrected_time(&mut state, &idle(), TimeBase::new(301, 30));
        assert_eq!(t, TimeBase::new(2, 30));
        assert_eq!(state.pause_correction, TimeBase::new(299, 30));
    }

    #[test]
    fn correction_never_shrinks() {
        let mut state = WriterTrackState::new();
        state.pause_correction = secs(5);
        after_write(&mut state, secs(4), secs(1));
        state.pending_correction_update = true;

        // Raw 9 would need only 4.
        let t = corrected_time(&mut state, &idle(), secs(9));
        assert_eq!(state.pause_correction, secs(5));
        assert_eq!(t, secs(4));
    }

    #[test]
    fn backwards_result_falls_back_to_raw() {
        let mut state = WriterTrackState::new();
        state.pause_correction = secs(10);
        after_write(&mut state, secs(2), secs(1));

        assert_eq!(corrected_time(&mut state, &idle(), secs(11)), secs(11));
        // Raw itself behind the track: clamp.
        assert_eq!(corrected_time(&mut state, &idle(), secs(1)), secs(2));
    }

    #[test]
    fn negative_first_frame_uses_raw() {
        let mut state = WriterTrackState::new();
        state.pause_correction = secs(3);
        assert_eq!(corrected_time(&mut state, &idle(), secs(1)), secs(1));
    }
}
