//! Observable session state
//!
//! The session is the only writer. Hosts read snapshots or subscribe to
//! change notifications through `DeckSession::subscribe`.

use crate::deck::DECK_COUNT;


/// Snapshot of the shared session state.
#[derive( Debug, Clone, PartialEq )]
pub struct SessionState {
    /// Deck targeted by transport and progress operations.
    pub active_index: usize,

    /// Whether the active deck is advancing.
    pub is_playing: bool,

    /// Position of the active deck in seconds.
    pub current_time: f64,

    /// Length of the active track in seconds, 0 when unknown.
    pub duration: f64,

    /// True only while the overlap callback is running.
    pub overlap_started: bool,

    /// Last whole second of remaining time that was logged, -1 before any.
    pub last_near_end_log_second: i64,

    /// Source identifier per slot. Empty means unset.
    pub sources: [String; DECK_COUNT],
}


impl Default for SessionState {
    fn default() -> Self {
        Self {
            active_index: 0,
            is_playing: false,
            current_time: 0.0,
            duration: 0.0,
            overlap_started: false,
            last_near_end_log_second: -1,
            sources: Default::default(),
        }
    }
}


impl SessionState {
    /// Seconds left on the active track. Not clamped.
    pub fn remaining( &self ) -> f64 {
        self.duration - self.current_time
    }
}


/// Writes `value` into `field`, reporting whether anything changed.
pub(crate) fn assign<T: PartialEq>( field: &mut T, value: T ) -> bool {
    if *field == value {
        false
    } else {
        *field = value;
        true
    }
}


/// Like `assign`, but a NaN position replacing a NaN position is not a
/// change.
pub(crate) fn assign_time( field: &mut f64, value: f64 ) -> bool {
    if field.is_nan() && value.is_nan() {
        return false;
    }
    assign( field, value )
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_default_state() {
        let state = SessionState::default();
        assert_eq!( state.active_index, 0 );
        assert!( !state.is_playing );
        assert!( !state.overlap_started );
        assert_eq!( state.last_near_end_log_second, -1 );
        assert!( state.sources.iter().all( |s| s.is_empty() ) );
    }


    #[test]
    fn test_assign_reports_change() {
        let mut value = 1.0;
        assert!( !assign( &mut value, 1.0 ) );
        assert!( assign( &mut value, 2.5 ) );
        assert_eq!( value, 2.5 );
    }


    #[test]
    fn test_assign_time_nan_is_unchanged() {
        let mut time = 0.0;
        assert!( assign_time( &mut time, f64::NAN ) );
        assert!( !assign_time( &mut time, f64::NAN ) );
        assert!( assign_time( &mut time, 4.0 ) );
        assert!( !assign_time( &mut time, 4.0 ) );
    }
}
