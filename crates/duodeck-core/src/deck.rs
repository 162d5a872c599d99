//! Deck slots and the playback handle contract.
//!
//! A deck is one of two fixed slots. The handle bound to a slot is owned
//! by the host; the session only borrows it through `Arc`.

use std::future::Future;

use thiserror::Error;


/// Number of deck slots. Slot identity is positional.
pub const DECK_COUNT: usize = 2;


/// Errors a deck handle can report when starting playback.
#[derive( Debug, Clone, PartialEq, Error )]
pub enum DeckError {
    #[error( "Playback not allowed: {0}" )]
    NotAllowed( String ),

    #[error( "Source not supported: {0}" )]
    Unsupported( String ),

    #[error( "Playback aborted: {0}" )]
    Aborted( String ),

    #[error( "Output device error: {0}" )]
    Device( String ),
}


/// External, mutable audio playback handle bound to a deck slot.
///
/// All methods take `&self`: a handle is shared between the host and the
/// session, so implementations keep their mutable state behind interior
/// mutability.
pub trait DeckHandle: Send + Sync + 'static {
    /// Current playback position in seconds.
    fn current_time( &self ) -> f64;

    /// Moves the playback position to `time` seconds.
    fn set_current_time( &self, time: f64 );

    /// Track length in seconds. May be NaN or infinite until metadata loads.
    fn duration( &self ) -> f64;

    /// Returns true while the handle is not advancing.
    fn is_paused( &self ) -> bool;

    /// Pauses playback without touching the position.
    fn pause( &self );

    /// Binds a new source identifier to the handle.
    fn load( &self, source: &str );

    /// Starts playback. Resolves once the output is actually running.
    fn play( &self ) -> impl Future<Output = Result<(), DeckError>> + Send;
}


/// Returns the slot that is not `index`.
pub fn other_index( index: usize ) -> usize {
    if index == 0 { 1 } else { 0 }
}


/// Returns true if `index` names one of the deck slots.
pub fn is_valid_index( index: usize ) -> bool {
    index < DECK_COUNT
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_other_index() {
        assert_eq!( other_index( 0 ), 1 );
        assert_eq!( other_index( 1 ), 0 );
    }


    #[test]
    fn test_valid_index() {
        assert!( is_valid_index( 0 ) );
        assert!( is_valid_index( 1 ) );
        assert!( !is_valid_index( 2 ) );
        assert!( !is_valid_index( usize::MAX ) );
    }
}
