//! Transport control
//!
//! Start/stop/pause/seek over either deck, keyed by slot index. A missing
//! handle is never an error: every operation on an empty slot is a no-op.

use crate::deck::{ DeckError, DeckHandle, DECK_COUNT };
use crate::diagnostic::Diagnostic;
use crate::session::{ DeckSession, Slots };
use crate::state::{ assign, assign_time };


impl<D: DeckHandle> DeckSession<D> {
    /// Pauses a deck and rewinds it to the start.
    ///
    /// Leaves `is_playing` alone.
    pub fn stop_player( &self, index: usize ) {
        let index = self.resolve_index( index );
        let slots = self.slots();
        stop_slot( &slots, index );
    }


    /// Pauses a deck, keeping its position.
    pub fn pause_player( &self, index: usize ) {
        let index = self.resolve_index( index );
        let slots = self.slots();
        pause_slot( &slots, index );
    }


    /// Stops both decks, in slot order, and clears `is_playing`.
    pub fn stop_all( &self ) {
        let slots = self.slots();
        for index in 0..DECK_COUNT {
            stop_slot( &slots, index );
        }
        self.set_playing( false );
    }


    /// Pauses both decks, in slot order, and clears `is_playing`.
    pub fn pause_all( &self ) {
        let slots = self.slots();
        for index in 0..DECK_COUNT {
            pause_slot( &slots, index );
        }
        self.set_playing( false );
    }


    /// Starts the active deck.
    ///
    /// `is_playing` is set only once the handle reports that playback
    /// started. A start failure is returned as is and leaves the state
    /// untouched.
    pub async fn play_active( &self ) -> Result<(), DeckError> {
        let Some( deck ) = self.get_active_deck() else {
            return Ok(());
        };

        deck.play().await?;
        self.set_playing( true );
        Ok(())
    }


    /// Plays the active deck if it is paused, otherwise pauses both decks.
    ///
    /// Pausing covers both slots so that a deck left running elsewhere is
    /// silenced too.
    pub async fn toggle_play_pause( &self ) -> Result<(), DeckError> {
        let index = self.active_index();
        let Some( deck ) = self.get_active_deck() else {
            return Ok(());
        };

        if deck.is_paused() {
            deck.play().await?;
            self.set_playing( true );
            self.emit( Diagnostic::Play { index } );
        } else {
            self.pause_all();
            self.emit( Diagnostic::Pause );
        }

        Ok(())
    }


    /// Moves the active deck to `time` seconds.
    ///
    /// `current_time` is updated right away instead of on the next tick.
    pub fn seek( &self, time: f64 ) {
        let slots = self.slots();
        let Some( deck ) = self.active_in( &slots ) else {
            return;
        };

        deck.set_current_time( time );
        self.update( |s| assign_time( &mut s.current_time, time ) );
    }


    fn set_playing( &self, playing: bool ) {
        self.update( |s| assign( &mut s.is_playing, playing ) );
    }
}


fn stop_slot<D: DeckHandle>( slots: &Slots<D>, index: usize ) {
    if let Some( ref deck ) = slots[ index ] {
        deck.pause();
        deck.set_current_time( 0.0 );
    }
}


fn pause_slot<D: DeckHandle>( slots: &Slots<D>, index: usize ) {
    if let Some( ref deck ) = slots[ index ] {
        deck.pause();
    }
}


#[cfg( test )]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::SessionConfig;
    use crate::testing::{ recording_config, MockDeck };


    fn session_with(
        left: Option<Arc<MockDeck>>,
        right: Option<Arc<MockDeck>>,
    ) -> DeckSession<MockDeck> {
        let session = DeckSession::new( SessionConfig::default() );
        if let Some( deck ) = left {
            session.attach_deck( 0, deck );
        }
        if let Some( deck ) = right {
            session.attach_deck( 1, deck );
        }
        session
    }


    #[test]
    fn test_stop_player_rewinds() {
        let left = MockDeck::playing( 100.0, 42.0 );
        let session = session_with( Some( Arc::clone( &left ) ), None );

        session.stop_player( 0 );

        assert!( left.is_paused() );
        assert_eq!( left.current_time(), 0.0 );
    }


    #[tokio::test]
    async fn test_stop_player_keeps_is_playing() {
        let left = MockDeck::with_track( 100.0 );
        let session = session_with( Some( Arc::clone( &left ) ), None );
        session.play_active().await.unwrap();

        session.stop_player( 0 );

        assert!( session.is_playing() );
    }


    #[test]
    fn test_pause_player_keeps_position() {
        let right = MockDeck::playing( 100.0, 42.0 );
        let session = session_with( None, Some( Arc::clone( &right ) ) );

        session.pause_player( 1 );

        assert!( right.is_paused() );
        assert_eq!( right.current_time(), 42.0 );
    }


    #[test]
    fn test_empty_slot_is_noop() {
        let session = session_with( None, None );
        session.stop_player( 0 );
        session.pause_player( 1 );
        session.seek( 12.0 );
        assert_eq!( session.current_time(), 0.0 );
    }


    #[tokio::test]
    async fn test_stop_all_clears_is_playing() {
        let left = MockDeck::with_track( 100.0 );
        let right = MockDeck::playing( 100.0, 30.0 );
        let session = session_with( Some( Arc::clone( &left ) ), Some( Arc::clone( &right ) ) );
        session.play_active().await.unwrap();
        left.set_time( 20.0 );

        session.stop_all();

        assert!( !session.is_playing() );
        assert!( left.is_paused() && right.is_paused() );
        assert_eq!( left.current_time(), 0.0 );
        assert_eq!( right.current_time(), 0.0 );
    }


    #[tokio::test]
    async fn test_pause_all_clears_is_playing() {
        let left = MockDeck::with_track( 100.0 );
        let right = MockDeck::playing( 100.0, 30.0 );
        let session = session_with( Some( Arc::clone( &left ) ), Some( Arc::clone( &right ) ) );
        session.play_active().await.unwrap();
        left.set_time( 20.0 );

        session.pause_all();

        assert!( !session.is_playing() );
        assert!( left.is_paused() && right.is_paused() );
        assert_eq!( left.current_time(), 20.0 );
        assert_eq!( right.current_time(), 30.0 );
    }


    #[tokio::test]
    async fn test_stop_and_pause_all_without_decks() {
        let session = session_with( None, None );
        session.stop_all();
        assert!( !session.is_playing() );
        session.pause_all();
        assert!( !session.is_playing() );
    }


    #[tokio::test]
    async fn test_play_active_sets_is_playing() {
        let right = MockDeck::with_track( 100.0 );
        let session = session_with( None, Some( Arc::clone( &right ) ) );
        session.set_active( 1 );

        session.play_active().await.unwrap();

        assert!( session.is_playing() );
        assert!( !right.is_paused() );
        assert_eq!( right.inner().play_calls, 1 );
    }


    #[tokio::test]
    async fn test_play_active_without_deck() {
        let session = session_with( None, Some( MockDeck::with_track( 100.0 ) ) );
        session.play_active().await.unwrap();
        assert!( !session.is_playing() );
    }


    #[tokio::test]
    async fn test_play_failure_propagates() {
        let left = MockDeck::with_track( 100.0 );
        left.fail_next_play( DeckError::NotAllowed( "no user gesture".into() ) );
        let session = session_with( Some( Arc::clone( &left ) ), None );

        let result = session.play_active().await;

        assert_eq!( result, Err( DeckError::NotAllowed( "no user gesture".into() ) ) );
        assert!( !session.is_playing() );
    }


    #[tokio::test]
    async fn test_toggle_plays_only_active() {
        let ( config, log ) = recording_config();
        let session = DeckSession::new( config );
        let left = MockDeck::with_track( 100.0 );
        let right = MockDeck::with_track( 100.0 );
        session.attach_deck( 0, Arc::clone( &left ) );
        session.attach_deck( 1, Arc::clone( &right ) );

        session.toggle_play_pause().await.unwrap();

        assert!( session.is_playing() );
        assert_eq!( left.inner().play_calls, 1 );
        assert_eq!( right.inner().play_calls, 0 );
        assert_eq!( *log.lock().unwrap(), vec![ Diagnostic::Play { index: 0 } ] );
    }


    #[tokio::test]
    async fn test_toggle_pauses_both() {
        let ( config, log ) = recording_config();
        let session = DeckSession::new( config );
        let left = MockDeck::with_track( 100.0 );
        let right = MockDeck::with_track( 100.0 );
        session.attach_deck( 0, Arc::clone( &left ) );
        session.attach_deck( 1, Arc::clone( &right ) );
        session.play_active().await.unwrap();

        session.toggle_play_pause().await.unwrap();

        assert!( !session.is_playing() );
        assert_eq!( left.inner().pause_calls, 1 );
        assert_eq!( right.inner().pause_calls, 1 );
        assert_eq!( *log.lock().unwrap(), vec![ Diagnostic::Pause ] );
    }


    #[tokio::test]
    async fn test_toggle_failure_leaves_state() {
        let left = MockDeck::with_track( 100.0 );
        left.fail_next_play( DeckError::Device( "unplugged".into() ) );
        let session = session_with( Some( Arc::clone( &left ) ), None );

        assert!( session.toggle_play_pause().await.is_err() );
        assert!( !session.is_playing() );
    }


    #[tokio::test]
    async fn test_toggle_without_deck() {
        let ( config, log ) = recording_config();
        let session: DeckSession<MockDeck> = DeckSession::new( config );
        session.toggle_play_pause().await.unwrap();
        assert!( !session.is_playing() );
        assert!( log.lock().unwrap().is_empty() );
    }


    #[test]
    fn test_seek_updates_current_time_immediately() {
        let left = MockDeck::playing( 180.0, 12.0 );
        let session = session_with( Some( Arc::clone( &left ) ), None );

        session.seek( 90.5 );

        assert_eq!( left.current_time(), 90.5 );
        assert_eq!( session.current_time(), 90.5 );
    }


    #[test]
    fn test_seek_targets_active_deck() {
        let left = MockDeck::playing( 180.0, 12.0 );
        let right = MockDeck::with_track( 180.0 );
        let session = session_with( Some( Arc::clone( &left ) ), Some( Arc::clone( &right ) ) );
        session.set_active( 1 );

        session.seek( 30.0 );

        assert_eq!( left.current_time(), 12.0 );
        assert_eq!( right.current_time(), 30.0 );
    }
}
