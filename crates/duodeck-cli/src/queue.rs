//! Track queue
//!
//! Hands out tracks in order for the deck handover, optionally starting
//! over when it runs out.

use std::path::PathBuf;


/// Ordered list of tracks waiting to be played.
#[derive( Debug, Default )]
pub struct TrackQueue {
    tracks: Vec<PathBuf>,
    next_index: usize,
    repeat: bool,
}


impl TrackQueue {
    /// Creates a queue over `tracks`.
    pub fn new( tracks: Vec<PathBuf>, repeat: bool ) -> Self {
        Self { tracks, next_index: 0, repeat }
    }


    /// Takes the next track.
    ///
    /// Returns None at the end of the queue unless repeat is on.
    pub fn next_track( &mut self ) -> Option<PathBuf> {
        if self.next_index >= self.tracks.len() {
            if !self.repeat || self.tracks.is_empty() {
                return None;
            }
            self.next_index = 0;
        }

        let track = self.tracks[ self.next_index ].clone();
        self.next_index += 1;
        Some( track )
    }


    /// Number of tracks not handed out yet in this pass.
    pub fn remaining( &self ) -> usize {
        self.tracks.len().saturating_sub( self.next_index )
    }


    pub fn len( &self ) -> usize {
        self.tracks.len()
    }


    pub fn is_empty( &self ) -> bool {
        self.tracks.is_empty()
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    fn paths( names: &[&str] ) -> Vec<PathBuf> {
        names.iter().map( PathBuf::from ).collect()
    }


    #[test]
    fn test_in_order_then_exhausted() {
        let mut queue = TrackQueue::new( paths( &[ "a", "b" ] ), false );
        assert_eq!( queue.next_track(), Some( PathBuf::from( "a" ) ) );
        assert_eq!( queue.remaining(), 1 );
        assert_eq!( queue.next_track(), Some( PathBuf::from( "b" ) ) );
        assert_eq!( queue.next_track(), None );
        assert_eq!( queue.next_track(), None );
    }


    #[test]
    fn test_repeat_wraps() {
        let mut queue = TrackQueue::new( paths( &[ "a", "b" ] ), true );
        queue.next_track();
        queue.next_track();
        assert_eq!( queue.next_track(), Some( PathBuf::from( "a" ) ) );
    }


    #[test]
    fn test_empty_with_repeat() {
        let mut queue = TrackQueue::new( Vec::new(), true );
        assert!( queue.is_empty() );
        assert_eq!( queue.next_track(), None );
    }
}
