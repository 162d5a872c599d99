//! Clock-driven deck handle
//!
//! Stands in for an audio output: keeps a playback clock per deck and
//! learns each track's length by probing the file. No audio is decoded.
//!
//! `load` runs with the session's slots locked, so hosts probe ahead of
//! time with `probe_blocking` and hand the result over through `stage`.

use std::path::{ Path, PathBuf };
use std::sync::{ Mutex, MutexGuard, PoisonError };

use duodeck_core::{ DeckError, DeckHandle };
use tokio::time::Instant;

use crate::probe::{ self, TrackInfo };


/// Outcome of probing a source, with the error already rendered.
pub type ProbeResult = Result<TrackInfo, String>;


/// Deck handle backed by a virtual playback clock.
pub struct ClockDeck {
    name: &'static str,
    clock: Mutex<Clock>,
    /// Probe result prepared for the next `load` of a given source
    staged: Mutex<Option<( String, ProbeResult )>>,
}


#[derive( Debug, Default )]
struct Clock {
    source: String,
    info: Option<TrackInfo>,
    /// Why the last load could not be probed
    load_error: Option<String>,
    /// Position at the moment `started_at` was taken, or the paused position
    anchor: f64,
    started_at: Option<Instant>,
}


impl Clock {
    fn duration( &self ) -> f64 {
        self.info.as_ref()
            .and_then( |i| i.duration )
            .unwrap_or( f64::NAN )
    }


    fn position( &self ) -> f64 {
        let position = match self.started_at {
            Some( started ) => self.anchor + started.elapsed().as_secs_f64(),
            None => self.anchor,
        };

        let duration = self.duration();
        if duration.is_finite() { position.min( duration ) } else { position }
    }


    fn ended( &self ) -> bool {
        let duration = self.duration();
        duration.is_finite() && self.position() >= duration
    }
}


impl ClockDeck {
    /// Creates an empty deck.
    pub fn new( name: &'static str ) -> Self {
        Self {
            name,
            clock: Mutex::new( Clock::default() ),
            staged: Mutex::new( None ),
        }
    }


    /// Hands over a probe result for `source`. The next `load` of that
    /// source uses it instead of opening the file.
    pub fn stage( &self, source: impl Into<String>, result: ProbeResult ) {
        *self.staged.lock().unwrap_or_else( PoisonError::into_inner ) = Some( ( source.into(), result ) );
    }


    /// Deck name used in log output.
    pub fn name( &self ) -> &'static str {
        self.name
    }


    /// What the probe learned about the loaded track.
    pub fn track_info( &self ) -> Option<TrackInfo> {
        self.clock().info.clone()
    }


    fn clock( &self ) -> MutexGuard<'_, Clock> {
        self.clock.lock().unwrap_or_else( PoisonError::into_inner )
    }


    fn take_staged( &self, source: &str ) -> Option<ProbeResult> {
        let mut staged = self.staged.lock().unwrap_or_else( PoisonError::into_inner );
        match staged.take() {
            Some( ( staged_source, result ) ) if staged_source == source => Some( result ),
            _ => None,
        }
    }
}


/// Probes `path` on the blocking thread pool.
pub async fn probe_blocking( path: PathBuf ) -> ProbeResult {
    tokio::task::spawn_blocking( move || probe::probe( &path ) )
        .await
        .map_err( |e| format!( "Probe task failed: {}", e ) )?
        .map_err( |e| format!( "{:#}", e ) )
}


impl DeckHandle for ClockDeck {
    fn current_time( &self ) -> f64 {
        self.clock().position()
    }


    fn set_current_time( &self, time: f64 ) {
        let mut clock = self.clock();
        let duration = clock.duration();
        let time = if duration.is_finite() { time.clamp( 0.0, duration ) } else { time.max( 0.0 ) };

        clock.anchor = time;
        if clock.started_at.is_some() {
            clock.started_at = Some( Instant::now() );
        }
    }


    fn duration( &self ) -> f64 {
        self.clock().duration()
    }


    fn is_paused( &self ) -> bool {
        let clock = self.clock();
        clock.started_at.is_none() || clock.ended()
    }


    fn pause( &self ) {
        let mut clock = self.clock();
        clock.anchor = clock.position();
        clock.started_at = None;
    }


    fn load( &self, source: &str ) {
        let ( info, load_error ) = if source.is_empty() {
            ( None, None )
        } else {
            let probed = self.take_staged( source ).unwrap_or_else( || {
                probe::probe( Path::new( source ) ).map_err( |e| format!( "{:#}", e ) )
            });
            match probed {
                Ok( info ) => ( Some( info ), None ),
                Err( e ) => {
                    tracing::warn!( "Deck {}: {}", self.name, e );
                    ( None, Some( e ) )
                }
            }
        };

        let mut clock = self.clock();
        *clock = Clock {
            source: source.to_string(),
            info,
            load_error,
            anchor: 0.0,
            started_at: None,
        };
    }


    async fn play( &self ) -> Result<(), DeckError> {
        let mut clock = self.clock();

        if clock.source.is_empty() {
            return Err( DeckError::Unsupported( format!( "deck {} has no source", self.name ) ) );
        }
        if let Some( ref error ) = clock.load_error {
            return Err( DeckError::Unsupported( error.clone() ) );
        }

        // Playing an ended track starts it over
        if clock.ended() {
            clock.anchor = 0.0;
            clock.started_at = None;
        }
        if clock.started_at.is_none() {
            clock.started_at = Some( Instant::now() );
        }

        tracing::debug!( "Deck {} playing {}", self.name, clock.source );
        Ok(())
    }
}


#[cfg( test )]
mod tests {
    use std::time::Duration;

    use super::*;


    /// Deck with a known track length, bypassing the file probe.
    fn deck_with_length( seconds: Option<f64> ) -> ClockDeck {
        let deck = ClockDeck::new( "A" );
        {
            let mut clock = deck.clock();
            clock.source = "track.flac".into();
            clock.info = Some( TrackInfo { duration: seconds, ..TrackInfo::default() } );
        }
        deck
    }


    #[tokio::test( start_paused = true )]
    async fn test_clock_advances_while_playing() {
        let deck = deck_with_length( Some( 60.0 ) );
        assert!( deck.is_paused() );

        deck.play().await.unwrap();
        tokio::time::advance( Duration::from_secs( 3 ) ).await;
        assert_eq!( deck.current_time(), 3.0 );

        deck.pause();
        tokio::time::advance( Duration::from_secs( 3 ) ).await;
        assert_eq!( deck.current_time(), 3.0 );
        assert!( deck.is_paused() );
    }


    #[tokio::test( start_paused = true )]
    async fn test_clock_stops_at_end() {
        let deck = deck_with_length( Some( 10.0 ) );
        deck.play().await.unwrap();

        tokio::time::advance( Duration::from_secs( 12 ) ).await;

        assert_eq!( deck.current_time(), 10.0 );
        assert!( deck.is_paused() );

        // Playing again starts over
        deck.play().await.unwrap();
        assert_eq!( deck.current_time(), 0.0 );
    }


    #[tokio::test( start_paused = true )]
    async fn test_seek_while_playing() {
        let deck = deck_with_length( Some( 60.0 ) );
        deck.play().await.unwrap();
        tokio::time::advance( Duration::from_secs( 5 ) ).await;

        deck.set_current_time( 40.0 );
        tokio::time::advance( Duration::from_secs( 2 ) ).await;

        assert_eq!( deck.current_time(), 42.0 );
    }


    #[test]
    fn test_unknown_length() {
        let deck = deck_with_length( None );
        assert!( deck.duration().is_nan() );
        deck.set_current_time( 500.0 );
        assert_eq!( deck.current_time(), 500.0 );
    }


    #[tokio::test]
    async fn test_play_without_source_fails() {
        let deck = ClockDeck::new( "B" );
        assert!( matches!( deck.play().await, Err( DeckError::Unsupported( _ ) ) ) );
    }


    #[test]
    fn test_load_uses_staged_probe() {
        let deck = ClockDeck::new( "A" );
        let info = TrackInfo { duration: Some( 42.0 ), ..TrackInfo::default() };
        deck.stage( "/not/on/disk.flac", Ok( info.clone() ) );

        deck.load( "/not/on/disk.flac" );

        assert_eq!( deck.duration(), 42.0 );
        assert_eq!( deck.track_info(), Some( info ) );
    }


    #[tokio::test]
    async fn test_staged_probe_for_other_source_is_dropped() {
        let deck = ClockDeck::new( "A" );
        deck.stage( "a.flac", Ok( TrackInfo { duration: Some( 42.0 ), ..TrackInfo::default() } ) );

        deck.load( "/nonexistent/b.flac" );
        assert!( deck.duration().is_nan() );
        assert!( deck.play().await.is_err() );

        // The stale entry is gone as well
        deck.load( "a.flac" );
        assert!( deck.duration().is_nan() );
    }


    #[tokio::test]
    async fn test_staged_probe_failure() {
        let deck = ClockDeck::new( "B" );
        deck.stage( "x.mp3", Err( "Unsupported format".into() ) );
        deck.load( "x.mp3" );

        match deck.play().await {
            Err( DeckError::Unsupported( message ) ) => assert_eq!( message, "Unsupported format" ),
            other => panic!( "unexpected: {:?}", other ),
        }
    }


    #[tokio::test]
    async fn test_probe_blocking_missing_file() {
        assert!( probe_blocking( PathBuf::from( "/nonexistent/track.mp3" ) ).await.is_err() );
    }


    #[tokio::test]
    async fn test_play_unreadable_source_fails() {
        let deck = ClockDeck::new( "B" );
        deck.load( "/nonexistent/track.mp3" );

        assert!( deck.duration().is_nan() );
        assert!( matches!( deck.play().await, Err( DeckError::Unsupported( _ ) ) ) );
    }
}
