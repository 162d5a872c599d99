//! Deck session
//!
//! The composition root: owns the two deck slots and the shared state,
//! exposes the slot accessors, and drives progress sampling from a timer
//! that lives exactly as long as the session is mounted.
//!
//! Transport operations live in `transport.rs`, progress tracking in
//! `progress.rs`; both are further `impl` blocks on `DeckSession`.

use std::sync::{ Arc, Mutex, MutexGuard, PoisonError, Weak };
use std::sync::atomic::{ AtomicBool, Ordering };
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{ self, Instant, MissedTickBehavior };

use crate::config::{ OverlapCallback, OverlapError, SessionConfig, MIN_POLL_INTERVAL };
use crate::deck::{ self, DeckHandle, DECK_COUNT };
use crate::diagnostic::{ Diagnostic, Diagnostics };
use crate::state::{ assign, SessionState };


/// Errors surfaced by session operations.
#[derive( Debug, Error )]
pub enum SessionError {
    #[error( "Overlap callback failed: {0}" )]
    Overlap( #[source] OverlapError ),
}


/// Deck handles per slot.
pub(crate) type Slots<D> = [Option<Arc<D>>; DECK_COUNT];


/// State shared between the session handles and the polling task.
pub(crate) struct Shared<D> {
    /// Locked for the synchronous body of every operation, which keeps a
    /// caller action and a polling tick from interleaving.
    pub(crate) slots: Mutex<Slots<D>>,
    pub(crate) state: watch::Sender<SessionState>,
    /// Set once the overlap callback has fired for the current approach.
    pub(crate) overlap_latched: AtomicBool,
    pub(crate) overlap_seconds: f64,
    pub(crate) poll_interval: Duration,
    pub(crate) on_overlap: Option<OverlapCallback>,
    pub(crate) diagnostics: Diagnostics,
}


/// Dual-deck playback session.
///
/// Cheap to clone; all clones drive the same decks and state.
pub struct DeckSession<D: DeckHandle> {
    pub(crate) shared: Arc<Shared<D>>,
}


impl<D: DeckHandle> Clone for DeckSession<D> {
    fn clone( &self ) -> Self {
        Self { shared: Arc::clone( &self.shared ) }
    }
}


impl<D: DeckHandle> DeckSession<D> {
    /// Creates a session with both slots empty and deck 0 active.
    pub fn new( config: SessionConfig ) -> Self {
        let ( state, _ ) = watch::channel( SessionState::default() );

        Self {
            shared: Arc::new( Shared {
                slots: Mutex::new( [ None, None ] ),
                state,
                overlap_latched: AtomicBool::new( false ),
                overlap_seconds: config.overlap_seconds,
                poll_interval: config.poll_interval.max( MIN_POLL_INTERVAL ),
                on_overlap: config.on_overlap,
                diagnostics: Diagnostics::new( config.logger ),
            }),
        }
    }


    // Slot binding

    /// Binds a handle to a slot, replacing any previous one.
    ///
    /// If the slot already has a source, it is loaded into the new handle.
    pub fn attach_deck( &self, index: usize, handle: Arc<D> ) {
        let index = self.resolve_index( index );
        let mut slots = self.slots();

        let source = self.shared.state.borrow().sources[ index ].clone();
        if !source.is_empty() {
            handle.load( &source );
        }

        slots[ index ] = Some( handle );
        tracing::debug!( "Deck {} attached", index );
    }


    /// Unbinds the handle from a slot and returns it.
    pub fn detach_deck( &self, index: usize ) -> Option<Arc<D>> {
        let index = self.resolve_index( index );
        let handle = self.slots()[ index ].take();
        tracing::debug!( "Deck {} detached", index );
        handle
    }


    // Selectors

    /// Returns the handle in a slot. Out-of-range indices select slot 0.
    pub fn get_deck( &self, index: usize ) -> Option<Arc<D>> {
        let index = self.resolve_index( index );
        self.slots()[ index ].clone()
    }


    /// Returns the handle of the active deck.
    pub fn get_active_deck( &self ) -> Option<Arc<D>> {
        let slots = self.slots();
        self.active_in( &slots ).cloned()
    }


    /// Returns the slot that is not active.
    pub fn get_inactive_index( &self ) -> usize {
        deck::other_index( self.active_index() )
    }


    /// Makes `index` the active deck.
    ///
    /// The previously active deck keeps playing; stopping it is up to the
    /// caller, which is what allows both decks to sound during a handover.
    pub fn set_active( &self, index: usize ) {
        let index = self.resolve_index( index );
        let _slots = self.slots();
        if self.active_index() != index {
            self.shared.overlap_latched.store( false, Ordering::Relaxed );
            self.update( |s| assign( &mut s.active_index, index ) );
        }
    }


    /// Sets the source identifier of a slot.
    ///
    /// The source is loaded into the attached handle, if any, and the call
    /// yields once before returning so that state observers have caught up.
    pub async fn set_source( &self, index: usize, source: impl Into<String> ) {
        let index = self.resolve_index( index );
        let source = source.into();

        {
            let slots = self.slots();
            let unchanged = self.shared.state.borrow().sources[ index ] == source;
            if !unchanged {
                if let Some( ref deck ) = slots[ index ] {
                    deck.load( &source );
                }
                self.update( |s| assign( &mut s.sources[ index ], source ) );
            }
        }

        tokio::task::yield_now().await;
    }


    // Observable state

    /// Returns a snapshot of the session state.
    pub fn state( &self ) -> SessionState {
        self.shared.state.borrow().clone()
    }


    /// Subscribes to state changes.
    pub fn subscribe( &self ) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }


    pub fn active_index( &self ) -> usize {
        self.shared.state.borrow().active_index
    }


    pub fn is_playing( &self ) -> bool {
        self.shared.state.borrow().is_playing
    }


    pub fn current_time( &self ) -> f64 {
        self.shared.state.borrow().current_time
    }


    pub fn duration( &self ) -> f64 {
        self.shared.state.borrow().duration
    }


    pub fn overlap_started( &self ) -> bool {
        self.shared.state.borrow().overlap_started
    }


    /// Returns the source identifier of a slot. Out-of-range indices select slot 0.
    pub fn source( &self, index: usize ) -> String {
        let index = self.resolve_index( index );
        self.shared.state.borrow().sources[ index ].clone()
    }


    pub fn overlap_seconds( &self ) -> f64 {
        self.shared.overlap_seconds
    }


    pub fn poll_interval( &self ) -> Duration {
        self.shared.poll_interval
    }


    // Lifecycle

    /// Starts the progress polling timer on the current tokio runtime.
    ///
    /// The timer runs until the returned guard is unmounted or dropped.
    /// Its first tick fires one full interval after mounting.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn mount( &self ) -> MountGuard {
        let period = self.shared.poll_interval;
        let shared = Arc::downgrade( &self.shared );

        tracing::debug!( "Progress polling started ({:?} interval)", period );

        MountGuard {
            task: tokio::spawn( poll_progress( shared, period ) ),
        }
    }


    // Internals

    pub(crate) fn slots( &self ) -> MutexGuard<'_, Slots<D>> {
        self.shared.slots.lock().unwrap_or_else( PoisonError::into_inner )
    }


    /// Returns the active handle from already locked slots.
    pub(crate) fn active_in<'a>( &self, slots: &'a Slots<D> ) -> Option<&'a Arc<D>> {
        slots[ self.active_index() ].as_ref()
    }


    /// Applies `modify` to the state; observers are notified only when it
    /// reports a change.
    pub(crate) fn update<F>( &self, modify: F )
    where
        F: FnOnce( &mut SessionState ) -> bool,
    {
        self.shared.state.send_if_modified( modify );
    }


    pub(crate) fn emit( &self, diagnostic: Diagnostic ) {
        self.shared.diagnostics.emit( diagnostic );
    }


    /// Coerces an out-of-range slot index to 0.
    pub(crate) fn resolve_index( &self, index: usize ) -> usize {
        if deck::is_valid_index( index ) {
            index
        } else {
            self.emit( Diagnostic::InvalidDeckIndex { index } );
            0
        }
    }
}


/// Keeps the progress polling timer running.
///
/// Dropping the guard cancels the timer. An overlap callback that is
/// already running is left to finish on its own.
#[must_use = "dropping the guard stops progress polling"]
pub struct MountGuard {
    task: JoinHandle<()>,
}


impl MountGuard {
    /// Stops progress polling.
    pub fn unmount( self ) {
        drop( self );
    }


    /// Returns true while the polling task is alive.
    pub fn is_mounted( &self ) -> bool {
        !self.task.is_finished()
    }
}


impl Drop for MountGuard {
    fn drop( &mut self ) {
        self.task.abort();
        tracing::debug!( "Progress polling stopped" );
    }
}


/// The polling loop. Holds the session weakly so an abandoned session
/// ends the loop on the next tick.
async fn poll_progress<D: DeckHandle>( shared: Weak<Shared<D>>, period: Duration ) {
    let mut ticker = time::interval_at( Instant::now() + period, period );
    ticker.set_missed_tick_behavior( MissedTickBehavior::Skip );

    loop {
        ticker.tick().await;

        let Some( shared ) = shared.upgrade() else {
            tracing::debug!( "Progress polling: session dropped" );
            break;
        };
        let session = DeckSession { shared };

        // The callback runs as its own task so later ticks keep sampling;
        // the overlap guard turns those ticks into no-ops meanwhile.
        if let Some( trigger ) = session.advance() {
            tokio::spawn( async move {
                if let Err( e ) = trigger.fire().await {
                    tracing::warn!( "{}", e );
                }
            });
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::testing::{ recording_config, MockDeck };


    fn session() -> DeckSession<MockDeck> {
        DeckSession::new( SessionConfig::default() )
    }


    #[test]
    fn test_empty_slots() {
        let session = session();
        assert!( session.get_deck( 0 ).is_none() );
        assert!( session.get_deck( 1 ).is_none() );
        assert!( session.get_active_deck().is_none() );
    }


    #[test]
    fn test_invalid_index_coerced_with_one_diagnostic() {
        let ( config, log ) = recording_config();
        let session = DeckSession::new( config );
        let left = MockDeck::new();
        session.attach_deck( 0, Arc::clone( &left ) );
        session.attach_deck( 1, MockDeck::new() );

        for index in [ 2, 3, 17, usize::MAX ] {
            log.lock().unwrap().clear();

            let deck = session.get_deck( index ).unwrap();

            assert!( Arc::ptr_eq( &deck, &left ) );
            assert_eq!(
                *log.lock().unwrap(),
                vec![ Diagnostic::InvalidDeckIndex { index } ]
            );
        }
    }


    #[test]
    fn test_valid_index_no_diagnostic() {
        let ( config, log ) = recording_config();
        let session: DeckSession<MockDeck> = DeckSession::new( config );
        session.get_deck( 0 );
        session.get_deck( 1 );
        assert!( log.lock().unwrap().is_empty() );
    }


    #[test]
    fn test_active_and_inactive() {
        let session = session();
        let right = MockDeck::new();
        session.attach_deck( 1, Arc::clone( &right ) );

        assert_eq!( session.active_index(), 0 );
        assert_eq!( session.get_inactive_index(), 1 );

        session.set_active( 1 );
        assert_eq!( session.active_index(), 1 );
        assert_eq!( session.get_inactive_index(), 0 );
        assert!( Arc::ptr_eq( &session.get_active_deck().unwrap(), &right ) );
    }


    #[test]
    fn test_set_active_out_of_range() {
        let ( config, log ) = recording_config();
        let session: DeckSession<MockDeck> = DeckSession::new( config );
        session.set_active( 1 );
        session.set_active( 4 );
        assert_eq!( session.active_index(), 0 );
        assert_eq!( *log.lock().unwrap(), vec![ Diagnostic::InvalidDeckIndex { index: 4 } ] );
    }


    #[test]
    fn test_set_active_does_not_stop_previous() {
        let session = session();
        let left = MockDeck::playing( 100.0, 10.0 );
        session.attach_deck( 0, Arc::clone( &left ) );

        session.set_active( 1 );

        assert!( !left.is_paused() );
        assert_eq!( left.inner().pause_calls, 0 );
    }


    #[tokio::test]
    async fn test_set_source_loads_handle() {
        let session = session();
        let right = MockDeck::new();
        session.attach_deck( 1, Arc::clone( &right ) );

        session.set_source( 1, "track-b.mp3" ).await;

        assert_eq!( session.source( 1 ), "track-b.mp3" );
        assert_eq!( session.source( 0 ), "" );
        assert_eq!( right.inner().source, "track-b.mp3" );
    }


    #[tokio::test]
    async fn test_set_source_same_value_does_not_reload() {
        let session = session();
        let left = MockDeck::new();
        session.attach_deck( 0, Arc::clone( &left ) );

        session.set_source( 0, "a.mp3" ).await;
        session.set_source( 0, "a.mp3" ).await;

        assert_eq!( left.inner().load_calls, 1 );
    }


    #[tokio::test]
    async fn test_set_source_without_handle() {
        let session = session();
        session.set_source( 0, "a.mp3" ).await;
        assert_eq!( session.source( 0 ), "a.mp3" );

        // Binding the handle afterwards picks the source up
        let left = MockDeck::new();
        session.attach_deck( 0, Arc::clone( &left ) );
        assert_eq!( left.inner().source, "a.mp3" );
    }


    #[tokio::test]
    async fn test_set_source_notifies_subscribers() {
        let session = session();
        let mut rx = session.subscribe();

        session.set_source( 0, "a.mp3" ).await;

        assert!( rx.has_changed().unwrap() );
        assert_eq!( rx.borrow_and_update().sources[ 0 ], "a.mp3" );
    }


    #[test]
    fn test_detach() {
        let session = session();
        session.attach_deck( 0, MockDeck::new() );
        assert!( session.detach_deck( 0 ).is_some() );
        assert!( session.get_deck( 0 ).is_none() );
    }


    #[tokio::test( start_paused = true )]
    async fn test_mount_polls_until_unmounted() {
        let session = session();
        let left = MockDeck::playing( 200.0, 10.0 );
        session.attach_deck( 0, Arc::clone( &left ) );

        let guard = session.mount();
        assert!( guard.is_mounted() );

        // Nothing happens before the first full interval
        left.set_time( 11.0 );
        tokio::task::yield_now().await;
        assert_eq!( session.current_time(), 0.0 );

        time::sleep( Duration::from_millis( 150 ) ).await;
        assert_eq!( session.current_time(), 11.0 );
        assert_eq!( session.duration(), 200.0 );

        guard.unmount();

        left.set_time( 12.0 );
        time::sleep( Duration::from_millis( 500 ) ).await;
        assert_eq!( session.current_time(), 11.0 );
    }


    #[tokio::test( start_paused = true )]
    async fn test_mount_uses_configured_interval() {
        let session: DeckSession<MockDeck> = DeckSession::new(
            SessionConfig::new().with_poll_interval( Duration::from_millis( 1000 ) )
        );
        let left = MockDeck::playing( 200.0, 3.0 );
        session.attach_deck( 0, Arc::clone( &left ) );

        let _guard = session.mount();

        time::sleep( Duration::from_millis( 500 ) ).await;
        assert_eq!( session.current_time(), 0.0 );

        time::sleep( Duration::from_millis( 600 ) ).await;
        assert_eq!( session.current_time(), 3.0 );
    }


    #[tokio::test( start_paused = true )]
    async fn test_polling_ends_when_session_dropped() {
        let session = session();
        let guard = session.mount();
        drop( session );

        time::sleep( Duration::from_millis( 250 ) ).await;
        assert!( !guard.is_mounted() );
    }
}
