//! Progress tracking and overlap detection
//!
//! Each tick copies the active deck's position and duration into the
//! session state, logs the approach to the end of the track once per whole
//! second, and fires the overlap callback when the active deck enters its
//! overlap window while playing.
//!
//! Overlap detection per approach: `Idle -> Triggering` once the window is
//! reached, `Triggering -> Idle` when the callback settles. The
//! `overlap_started` flag blocks re-entry while triggering. A latch keeps a
//! settled approach from firing again; it re-arms when the position leaves
//! the window, when the active deck changes, or when the callback fails.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::config::OverlapCallback;
use crate::deck::DeckHandle;
use crate::diagnostic::Diagnostic;
use crate::session::{ DeckSession, SessionError, Shared };
use crate::state::{ assign, assign_time };


/// Replaces a non-finite duration (unknown or streaming source) with 0.
pub fn normalize_duration( duration: f64 ) -> f64 {
    if duration.is_finite() { duration } else { 0.0 }
}


impl<D: DeckHandle> DeckSession<D> {
    /// Reports that a deck has loaded enough to know its duration.
    ///
    /// Ignored unless `index` is the active deck.
    pub fn on_metadata_ready( &self, index: usize ) {
        let slots = self.slots();
        if index != self.active_index() {
            return;
        }
        let Some( deck ) = self.active_in( &slots ) else {
            return;
        };

        let duration = normalize_duration( deck.duration() );
        self.update( |s| assign_time( &mut s.duration, duration ) );
    }


    /// Samples the active deck once and, when due, runs the overlap
    /// callback to completion.
    ///
    /// A callback failure is returned unaltered; the overlap guard is
    /// released either way.
    pub async fn sample( &self ) -> Result<(), SessionError> {
        match self.advance() {
            Some( trigger ) => trigger.fire().await,
            None => Ok(()),
        }
    }


    /// The synchronous part of a tick. Returns the armed trigger when the
    /// overlap condition was met.
    pub(crate) fn advance( &self ) -> Option<OverlapTrigger<D>> {
        let overlap_seconds = self.shared.overlap_seconds;
        let callback = self.shared.on_overlap.clone();
        let latch = &self.shared.overlap_latched;
        let mut near_end = None;
        let mut triggered = None;

        {
            let slots = self.slots();
            let index = self.active_index();
            let deck = slots[ index ].as_ref()?;

            let current_time = deck.current_time();
            let duration = normalize_duration( deck.duration() );

            self.update( |s| {
                let mut changed = assign_time( &mut s.current_time, current_time );
                changed |= assign_time( &mut s.duration, duration );

                let remaining = duration - current_time;
                if remaining.is_finite() && ( 0.0..=overlap_seconds + 1.0 ).contains( &remaining ) {
                    let second = remaining.floor() as i64;
                    if second != s.last_near_end_log_second {
                        s.last_near_end_log_second = second;
                        changed = true;
                        near_end = Some( Diagnostic::NearEnd { current_time, duration, remaining } );
                    }
                }

                let in_window = in_overlap_window( current_time, duration, overlap_seconds );
                if !in_window {
                    latch.store( false, Ordering::Relaxed );
                }

                let armed = !s.overlap_started && !latch.load( Ordering::Relaxed );
                if callback.is_some() && armed && s.is_playing && in_window {
                    s.overlap_started = true;
                    latch.store( true, Ordering::Relaxed );
                    changed = true;
                    triggered = Some( index );
                }

                changed
            });
        }

        if let Some( diagnostic ) = near_end {
            self.emit( diagnostic );
        }

        let ( index, callback ) = triggered.zip( callback )?;
        self.emit( Diagnostic::OverlapTriggered { index } );

        Some( OverlapTrigger {
            callback,
            guard: OverlapGuard { shared: Arc::clone( &self.shared ) },
        })
    }
}


/// Returns true when the position lies in the trailing overlap window.
fn in_overlap_window( current_time: f64, duration: f64, overlap_seconds: f64 ) -> bool {
    // Too short to ever reach the window
    if duration <= overlap_seconds {
        return false;
    }

    current_time >= duration - overlap_seconds
}


/// An armed overlap trigger. `overlap_started` is already set.
pub(crate) struct OverlapTrigger<D> {
    callback: OverlapCallback,
    guard: OverlapGuard<D>,
}


impl<D> OverlapTrigger<D> {
    /// Runs the callback and releases the guard once it settles.
    ///
    /// A failed callback re-arms the trigger for the next tick.
    pub(crate) async fn fire( self ) -> Result<(), SessionError> {
        let Self { callback, guard } = self;
        let result = callback().await;
        if result.is_err() {
            guard.shared.overlap_latched.store( false, Ordering::Relaxed );
        }
        drop( guard );
        result.map_err( SessionError::Overlap )
    }
}


/// Clears `overlap_started` on drop, so the guard is released on success,
/// on failure and when the callback future is dropped.
struct OverlapGuard<D> {
    shared: Arc<Shared<D>>,
}


impl<D> Drop for OverlapGuard<D> {
    fn drop( &mut self ) {
        self.shared.state.send_if_modified( |s| assign( &mut s.overlap_started, false ) );
    }
}


#[cfg( test )]
mod tests {
    use std::sync::atomic::{ AtomicUsize, Ordering };
    use std::sync::Mutex;

    use tokio::sync::oneshot;

    use super::*;
    use crate::config::{ OverlapError, SessionConfig };
    use crate::testing::{ recording_config, MockDeck };


    /// Session with an overlap callback that counts invocations and records
    /// the deck position at the moment it fires.
    fn counting_session(
        overlap_seconds: f64,
    ) -> ( DeckSession<MockDeck>, Arc<MockDeck>, Arc<Mutex<Vec<f64>>> ) {
        let deck = MockDeck::with_track( 100.0 );
        let fired_at = Arc::new( Mutex::new( Vec::new() ) );

        let probe = Arc::clone( &deck );
        let fired = Arc::clone( &fired_at );
        let config = SessionConfig::new()
            .with_overlap_seconds( overlap_seconds )
            .on_overlap( move || {
                fired.lock().unwrap().push( probe.current_time() );
                async { Ok::<(), OverlapError>(()) }
            });

        let session = DeckSession::new( config );
        session.attach_deck( 0, Arc::clone( &deck ) );
        ( session, deck, fired_at )
    }


    #[test]
    fn test_normalize_duration() {
        assert_eq!( normalize_duration( 12.5 ), 12.5 );
        assert_eq!( normalize_duration( f64::NAN ), 0.0 );
        assert_eq!( normalize_duration( f64::INFINITY ), 0.0 );
    }


    #[tokio::test]
    async fn test_sample_copies_position() {
        let ( session, deck, _ ) = counting_session( 5.0 );
        deck.set_time( 33.25 );

        session.sample().await.unwrap();

        assert_eq!( session.current_time(), 33.25 );
        assert_eq!( session.duration(), 100.0 );
    }


    #[tokio::test]
    async fn test_sample_without_active_deck() {
        let session: DeckSession<MockDeck> = DeckSession::new( SessionConfig::default() );
        session.attach_deck( 1, MockDeck::playing( 100.0, 50.0 ) );

        session.sample().await.unwrap();

        assert_eq!( session.current_time(), 0.0 );
        assert_eq!( session.duration(), 0.0 );
    }


    #[tokio::test]
    async fn test_sample_normalizes_unknown_duration() {
        let session: DeckSession<MockDeck> = DeckSession::new( SessionConfig::default() );
        let deck = MockDeck::playing( f64::NAN, 7.0 );
        session.attach_deck( 0, deck );

        session.sample().await.unwrap();

        assert_eq!( session.duration(), 0.0 );
        assert_eq!( session.current_time(), 7.0 );
    }


    #[tokio::test]
    async fn test_unknown_position_does_not_wake_subscribers() {
        let session: DeckSession<MockDeck> = DeckSession::new( SessionConfig::default() );
        session.attach_deck( 0, MockDeck::playing( f64::NAN, f64::NAN ) );
        let mut rx = session.subscribe();

        session.sample().await.unwrap();
        assert!( rx.has_changed().unwrap() );
        rx.borrow_and_update();

        session.sample().await.unwrap();
        session.sample().await.unwrap();

        assert!( !rx.has_changed().unwrap() );
        assert!( session.current_time().is_nan() );
    }


    #[tokio::test]
    async fn test_overlap_fires_once_per_approach() {
        let ( session, deck, fired_at ) = counting_session( 5.0 );
        session.play_active().await.unwrap();

        for time in [ 90.0, 94.9, 96.0, 97.0, 98.0, 99.0, 100.0 ] {
            deck.set_time( time );
            session.sample().await.unwrap();
        }

        assert_eq!( *fired_at.lock().unwrap(), vec![ 96.0 ] );
        assert!( !session.overlap_started() );
    }


    #[tokio::test]
    async fn test_overlap_rearms_after_leaving_window() {
        let ( session, deck, fired_at ) = counting_session( 5.0 );
        session.play_active().await.unwrap();

        deck.set_time( 97.0 );
        session.sample().await.unwrap();

        // Seeking back out of the window starts a new approach
        session.seek( 20.0 );
        session.sample().await.unwrap();
        deck.set_time( 98.0 );
        session.sample().await.unwrap();

        assert_eq!( *fired_at.lock().unwrap(), vec![ 97.0, 98.0 ] );
    }


    #[tokio::test]
    async fn test_overlap_fires_at_window_start() {
        let ( session, deck, fired_at ) = counting_session( 5.0 );
        session.play_active().await.unwrap();

        deck.set_time( 95.0 );
        session.sample().await.unwrap();

        assert_eq!( *fired_at.lock().unwrap(), vec![ 95.0 ] );
    }


    #[tokio::test]
    async fn test_no_overlap_for_short_track() {
        let ( session, deck, fired_at ) = counting_session( 5.0 );
        deck.inner().duration = 4.0;
        session.play_active().await.unwrap();

        for time in [ 0.0, 1.0, 2.0, 3.0, 3.9, 4.0 ] {
            deck.set_time( time );
            session.sample().await.unwrap();
        }

        assert!( fired_at.lock().unwrap().is_empty() );
    }


    #[tokio::test]
    async fn test_no_overlap_when_duration_equals_window() {
        let ( session, deck, fired_at ) = counting_session( 5.0 );
        deck.inner().duration = 5.0;
        session.play_active().await.unwrap();

        deck.set_time( 4.5 );
        session.sample().await.unwrap();

        assert!( fired_at.lock().unwrap().is_empty() );
    }


    #[tokio::test]
    async fn test_no_overlap_when_not_playing() {
        let ( session, deck, fired_at ) = counting_session( 5.0 );

        deck.set_time( 97.0 );
        session.sample().await.unwrap();

        assert!( fired_at.lock().unwrap().is_empty() );
    }


    #[tokio::test]
    async fn test_no_overlap_without_callback() {
        let session: DeckSession<MockDeck> = DeckSession::new( SessionConfig::default() );
        let deck = MockDeck::with_track( 100.0 );
        session.attach_deck( 0, Arc::clone( &deck ) );
        session.play_active().await.unwrap();

        deck.set_time( 98.0 );
        session.sample().await.unwrap();

        assert!( !session.overlap_started() );
    }


    #[tokio::test]
    async fn test_overlap_failure_propagates_and_releases_guard() {
        let calls = Arc::new( AtomicUsize::new( 0 ) );
        let calls_clone = Arc::clone( &calls );
        let config = SessionConfig::new().on_overlap( move || {
            calls_clone.fetch_add( 1, Ordering::SeqCst );
            async { Err::<(), OverlapError>( "next track missing".into() ) }
        });
        let session = DeckSession::new( config );
        let deck = MockDeck::with_track( 100.0 );
        session.attach_deck( 0, Arc::clone( &deck ) );
        session.play_active().await.unwrap();

        deck.set_time( 96.0 );
        let err = session.sample().await.unwrap_err();

        assert_eq!( err.to_string(), "Overlap callback failed: next track missing" );
        assert!( !session.overlap_started() );

        // A failed callback does not disable later triggers
        deck.set_time( 97.0 );
        assert!( session.sample().await.is_err() );
        assert_eq!( calls.load( Ordering::SeqCst ), 2 );
    }


    #[tokio::test]
    async fn test_guard_blocks_reentry_while_callback_pending() {
        let calls = Arc::new( AtomicUsize::new( 0 ) );
        let ( release_tx, release_rx ) = oneshot::channel::<()>();
        let release_rx = Arc::new( Mutex::new( Some( release_rx ) ) );

        let calls_clone = Arc::clone( &calls );
        let config = SessionConfig::new().on_overlap( move || {
            calls_clone.fetch_add( 1, Ordering::SeqCst );
            let rx = release_rx.lock().unwrap().take();
            async move {
                if let Some( rx ) = rx {
                    let _ = rx.await;
                }
                Ok::<(), OverlapError>(())
            }
        });
        let session = DeckSession::new( config );
        let deck = MockDeck::with_track( 100.0 );
        session.attach_deck( 0, Arc::clone( &deck ) );
        session.play_active().await.unwrap();
        deck.set_time( 96.0 );

        let pending = tokio::spawn({
            let session = session.clone();
            async move { session.sample().await }
        });
        tokio::task::yield_now().await;
        assert!( session.overlap_started() );

        // Ticks while the callback is pending collapse into plain samples
        deck.set_time( 96.1 );
        session.sample().await.unwrap();
        deck.set_time( 96.2 );
        session.sample().await.unwrap();
        assert_eq!( calls.load( Ordering::SeqCst ), 1 );
        assert_eq!( session.current_time(), 96.2 );

        release_tx.send(()).unwrap();
        pending.await.unwrap().unwrap();
        assert!( !session.overlap_started() );
    }


    #[tokio::test]
    async fn test_guard_released_when_callback_dropped() {
        let config = SessionConfig::new().on_overlap( || std::future::pending::<Result<(), OverlapError>>() );
        let session = DeckSession::new( config );
        let deck = MockDeck::with_track( 100.0 );
        session.attach_deck( 0, Arc::clone( &deck ) );
        session.play_active().await.unwrap();
        deck.set_time( 99.0 );

        let trigger = session.advance().unwrap();
        assert!( session.overlap_started() );

        drop( trigger );
        assert!( !session.overlap_started() );
    }


    #[tokio::test]
    async fn test_overlap_after_switching_decks() {
        let calls = Arc::new( AtomicUsize::new( 0 ) );
        let calls_clone = Arc::clone( &calls );
        let config = SessionConfig::new().on_overlap( move || {
            calls_clone.fetch_add( 1, Ordering::SeqCst );
            async { Ok::<(), OverlapError>(()) }
        });
        let session = DeckSession::new( config );
        let left = MockDeck::with_track( 100.0 );
        let right = MockDeck::with_track( 60.0 );
        session.attach_deck( 0, Arc::clone( &left ) );
        session.attach_deck( 1, Arc::clone( &right ) );
        session.play_active().await.unwrap();

        left.set_time( 96.0 );
        session.sample().await.unwrap();

        session.set_active( 1 );
        session.play_active().await.unwrap();
        session.stop_player( 0 );
        session.sample().await.unwrap();
        assert_eq!( session.duration(), 60.0 );

        right.set_time( 56.0 );
        session.sample().await.unwrap();
        assert_eq!( calls.load( Ordering::SeqCst ), 2 );
    }


    #[tokio::test]
    async fn test_near_end_logged_once_per_second() {
        let ( config, log ) = recording_config();
        let session = DeckSession::new( config );
        let deck = MockDeck::with_track( 100.0 );
        session.attach_deck( 0, Arc::clone( &deck ) );

        // 6.0 remaining is the first value inside [0, overlap + 1]
        for time in [ 93.0, 93.9, 94.0, 94.1, 94.5, 94.9, 95.0, 95.5, 95.9 ] {
            deck.set_time( time );
            session.sample().await.unwrap();
        }

        let seconds: Vec<f64> = log.lock().unwrap().iter()
            .filter_map( |d| match d {
                Diagnostic::NearEnd { remaining, .. } => Some( remaining.floor() ),
                _ => None,
            })
            .collect();
        assert_eq!( seconds, vec![ 6.0, 5.0, 4.0 ] );
        assert_eq!( session.state().last_near_end_log_second, 4 );
    }


    #[tokio::test]
    async fn test_near_end_skipped_outside_window() {
        let ( config, log ) = recording_config();
        let session = DeckSession::new( config );
        let deck = MockDeck::with_track( 100.0 );
        session.attach_deck( 0, Arc::clone( &deck ) );

        for time in [ 10.0, 50.0, 93.5, 100.5 ] {
            deck.set_time( time );
            session.sample().await.unwrap();
        }

        assert!( log.lock().unwrap().is_empty() );
        assert_eq!( session.state().last_near_end_log_second, -1 );
    }


    #[tokio::test]
    async fn test_near_end_diagnostic_contents() {
        let ( config, log ) = recording_config();
        let session = DeckSession::new( config );
        let deck = MockDeck::with_track( 100.0 );
        session.attach_deck( 0, Arc::clone( &deck ) );

        deck.set_time( 97.5 );
        session.sample().await.unwrap();

        let log = log.lock().unwrap();
        assert_eq!( log.len(), 1 );
        assert_eq!( log[ 0 ].to_string(), "near end: 97.50 / 100.00 (2.50 remaining)" );
    }


    #[tokio::test]
    async fn test_metadata_ready_for_active_deck() {
        let session: DeckSession<MockDeck> = DeckSession::new( SessionConfig::default() );
        session.attach_deck( 0, MockDeck::with_track( 245.5 ) );

        session.on_metadata_ready( 0 );

        assert_eq!( session.duration(), 245.5 );
    }


    #[tokio::test]
    async fn test_metadata_ready_for_inactive_deck_ignored() {
        let session: DeckSession<MockDeck> = DeckSession::new( SessionConfig::default() );
        session.attach_deck( 0, MockDeck::with_track( 120.0 ) );
        session.attach_deck( 1, MockDeck::with_track( 245.5 ) );
        session.on_metadata_ready( 0 );

        session.on_metadata_ready( 1 );
        session.on_metadata_ready( 9 );

        assert_eq!( session.duration(), 120.0 );
    }


    #[tokio::test]
    async fn test_metadata_ready_streaming_source() {
        let session: DeckSession<MockDeck> = DeckSession::new( SessionConfig::default() );
        session.attach_deck( 0, MockDeck::with_track( f64::INFINITY ) );

        session.on_metadata_ready( 0 );

        assert_eq!( session.duration(), 0.0 );
    }
}
