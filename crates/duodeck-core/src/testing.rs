//! Test doubles shared by the unit tests.

use std::sync::{ Arc, Mutex, MutexGuard };

use crate::config::SessionConfig;
use crate::deck::{ DeckError, DeckHandle };
use crate::diagnostic::Diagnostic;


/// Scripted deck handle. Time only moves when a test moves it.
pub(crate) struct MockDeck {
    inner: Mutex<MockState>,
}


pub(crate) struct MockState {
    pub current_time: f64,
    pub duration: f64,
    pub paused: bool,
    pub source: String,
    pub play_calls: usize,
    pub pause_calls: usize,
    pub load_calls: usize,
    pub play_error: Option<DeckError>,
}


impl MockDeck {
    /// Paused deck with no metadata yet.
    pub(crate) fn new() -> Arc<Self> {
        Self::build( f64::NAN, 0.0, true )
    }


    /// Paused deck at the start of a track of the given length.
    pub(crate) fn with_track( duration: f64 ) -> Arc<Self> {
        Self::build( duration, 0.0, true )
    }


    /// Deck that is already playing.
    pub(crate) fn playing( duration: f64, current_time: f64 ) -> Arc<Self> {
        Self::build( duration, current_time, false )
    }


    fn build( duration: f64, current_time: f64, paused: bool ) -> Arc<Self> {
        Arc::new( Self {
            inner: Mutex::new( MockState {
                current_time,
                duration,
                paused,
                source: String::new(),
                play_calls: 0,
                pause_calls: 0,
                load_calls: 0,
                play_error: None,
            }),
        })
    }


    pub(crate) fn inner( &self ) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap()
    }


    pub(crate) fn set_time( &self, time: f64 ) {
        self.inner().current_time = time;
    }


    /// Makes the next `play` call fail with `error`.
    pub(crate) fn fail_next_play( &self, error: DeckError ) {
        self.inner().play_error = Some( error );
    }
}


impl DeckHandle for MockDeck {
    fn current_time( &self ) -> f64 {
        self.inner().current_time
    }


    fn set_current_time( &self, time: f64 ) {
        self.inner().current_time = time;
    }


    fn duration( &self ) -> f64 {
        self.inner().duration
    }


    fn is_paused( &self ) -> bool {
        self.inner().paused
    }


    fn pause( &self ) {
        let mut inner = self.inner();
        inner.paused = true;
        inner.pause_calls += 1;
    }


    fn load( &self, source: &str ) {
        let mut inner = self.inner();
        inner.source = source.to_string();
        inner.load_calls += 1;
    }


    async fn play( &self ) -> Result<(), DeckError> {
        let mut inner = self.inner();
        inner.play_calls += 1;
        if let Some( error ) = inner.play_error.take() {
            return Err( error );
        }
        inner.paused = false;
        Ok(())
    }
}


/// Default configuration whose diagnostics are collected into a vector.
pub(crate) fn recording_config() -> ( SessionConfig, Arc<Mutex<Vec<Diagnostic>>> ) {
    let log = Arc::new( Mutex::new( Vec::new() ) );
    let sink = Arc::clone( &log );
    let config = SessionConfig::new().with_logger( move |d| {
        sink.lock().unwrap().push( d.clone() );
    });
    ( config, log )
}
