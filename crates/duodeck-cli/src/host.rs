//! Session host
//!
//! Binds two clock decks to a `DeckSession`, starts the first track, and
//! hands over to the other deck whenever the overlap trigger fires or a
//! track runs out without one.

use std::path::{ Path, PathBuf };
use std::sync::Arc;
use std::time::Duration;

use anyhow::{ Context, Result };
use tokio::sync::{ mpsc, oneshot };

use duodeck_core::{ DeckSession, OverlapError, SessionConfig, SessionState };

use crate::clock_deck::{ probe_blocking, ClockDeck };
use crate::queue::TrackQueue;
use crate::settings::Settings;


/// Requests sent from the session's overlap callback to the host loop.
#[derive( Debug )]
enum HostEvent {
    /// The active deck reached its overlap window. The reply is sent once
    /// the handover has finished.
    Overlap { done: oneshot::Sender<Result<(), String>> },
}


/// Formats seconds as M:SS.
fn format_time( seconds: f64 ) -> String {
    let total = if seconds.is_finite() { seconds.max( 0.0 ) as u64 } else { 0 };
    format!( "{}:{:02}", total / 60, total % 60 )
}


/// Returns true when the active track ran out without a handover.
fn track_finished( state: &SessionState ) -> bool {
    state.is_playing
        && !state.overlap_started
        && state.duration > 0.0
        && state.current_time >= state.duration
}


struct Host {
    session: DeckSession<ClockDeck>,
    queue: TrackQueue,
    /// Last whole second reported in the progress log
    last_reported: Option<u64>,
}


impl Host {
    /// Loads the next queued track into the inactive deck, makes it active
    /// and starts it, then stops the previous deck. If the new deck fails
    /// to start, the previous deck stays active.
    ///
    /// Returns Ok(false) when the queue is exhausted.
    async fn hand_over( &mut self ) -> Result<bool> {
        let Some( path ) = self.queue.next_track() else {
            return Ok( false );
        };

        let previous = self.session.active_index();
        let next = self.session.get_inactive_index();

        let source = self.prepare( next, &path ).await;
        self.session.set_source( next, source ).await;
        self.session.set_active( next );
        self.session.seek( 0.0 );
        self.session.on_metadata_ready( next );
        if let Err( e ) = self.session.play_active().await {
            // Keep tracking the deck that is still sounding
            self.session.set_active( previous );
            self.session.on_metadata_ready( previous );
            return Err( anyhow::Error::new( e ).context( format!( "Failed to start {:?}", path ) ) );
        }
        self.session.stop_player( previous );

        self.announce( next, &path );
        self.last_reported = None;
        Ok( true )
    }


    /// Starts the first playable track on the active deck.
    async fn start( &mut self ) -> Result<bool> {
        for _ in 0..self.queue.len() {
            let Some( path ) = self.queue.next_track() else {
                return Ok( false );
            };

            let index = self.session.active_index();
            let source = self.prepare( index, &path ).await;
            self.session.set_source( index, source ).await;
            self.session.on_metadata_ready( index );

            match self.session.play_active().await {
                Ok(()) => {
                    self.announce( index, &path );
                    return Ok( true );
                }
                Err( e ) => tracing::warn!( "Skipping {:?}: {}", path, e ),
            }
        }

        Ok( false )
    }


    /// Probes `path` off the runtime threads and stages the result on the
    /// deck at `index`. Returns the source identifier to load.
    async fn prepare( &self, index: usize, path: &Path ) -> String {
        let source = path.to_string_lossy().into_owned();
        let probed = probe_blocking( path.to_path_buf() ).await;
        if let Some( deck ) = self.session.get_deck( index ) {
            deck.stage( source.clone(), probed );
        }
        source
    }


    /// Keeps handing over until a track starts or the queue runs out.
    /// Gives up after one failed attempt per queued track.
    async fn advance_past_failures( &mut self ) -> bool {
        for _ in 0..self.queue.len() {
            match self.hand_over().await {
                Ok( started ) => return started,
                Err( e ) => tracing::warn!( "{:#}", e ),
            }
        }

        false
    }


    fn announce( &self, index: usize, path: &Path ) {
        let deck = self.session.get_deck( index );
        let label = deck.as_ref()
            .and_then( |d| d.track_info() )
            .and_then( |i| i.label() )
            .unwrap_or_else( || path.display().to_string() );
        let name = deck.as_ref().map( |d| d.name() ).unwrap_or( "?" );

        tracing::info!(
            "Deck {} now playing: {} ({})",
            name,
            label,
            format_time( self.session.duration() )
        );
    }


    fn report_progress( &mut self, state: &SessionState ) {
        let second = state.current_time.max( 0.0 ) as u64;
        if self.last_reported == Some( second ) {
            return;
        }
        self.last_reported = Some( second );

        tracing::debug!(
            "Deck {}: {} / {}",
            state.active_index,
            format_time( state.current_time ),
            format_time( state.duration )
        );
    }
}


/// Plays `files` until the queue runs out or Ctrl-C is pressed.
pub async fn run( files: Vec<PathBuf>, settings: &Settings ) -> Result<()> {
    let ( events_tx, mut events_rx ) = mpsc::channel( 4 );

    let config = SessionConfig::new()
        .with_overlap_seconds( settings.overlap_seconds )
        .with_poll_interval( Duration::from_millis( settings.poll_interval_ms ) )
        .on_overlap( move || {
            let events_tx = events_tx.clone();
            async move {
                let ( done, reply ) = oneshot::channel();
                events_tx.send( HostEvent::Overlap { done } ).await?;
                reply.await??;
                Ok::<(), OverlapError>(())
            }
        });

    let session = DeckSession::new( config );
    session.attach_deck( 0, Arc::new( ClockDeck::new( "A" ) ) );
    session.attach_deck( 1, Arc::new( ClockDeck::new( "B" ) ) );

    let queue = TrackQueue::new( files, settings.repeat );
    if queue.is_empty() {
        anyhow::bail!( "No files to play" );
    }

    let mut host = Host {
        session: session.clone(),
        queue,
        last_reported: None,
    };

    tracing::info!(
        "Queued {} tracks (overlap {}s, repeat {})",
        host.queue.len(),
        settings.overlap_seconds,
        settings.repeat
    );

    if !host.start().await? {
        anyhow::bail!( "None of the given files could be played" );
    }

    let mut state_rx = session.subscribe();
    let mounted = session.mount();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!( ctrl_c );

    loop {
        tokio::select! {
            Some( event ) = events_rx.recv() => match event {
                HostEvent::Overlap { done } => {
                    let result = match host.hand_over().await {
                        Ok( true ) => Ok(()),
                        Ok( false ) => {
                            tracing::debug!( "Queue exhausted, letting the last track finish" );
                            Ok(())
                        }
                        Err( e ) => Err( format!( "{:#}", e ) ),
                    };
                    let _ = done.send( result );
                }
            },

            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                host.report_progress( &state );

                if track_finished( &state ) && !host.advance_past_failures().await {
                    tracing::info!( "Queue finished ({} remaining)", host.queue.remaining() );
                    break;
                }
            }

            result = &mut ctrl_c => {
                result.context( "Failed to listen for Ctrl-C" )?;
                tracing::info!( "Interrupted" );
                break;
            }
        }
    }

    mounted.unmount();
    session.stop_all();
    Ok(())
}


#[cfg( test )]
mod tests {
    use duodeck_core::DeckHandle;

    use super::*;


    fn host( files: Vec<PathBuf> ) -> Host {
        let session = DeckSession::new( SessionConfig::default() );
        session.attach_deck( 0, Arc::new( ClockDeck::new( "A" ) ) );
        session.attach_deck( 1, Arc::new( ClockDeck::new( "B" ) ) );

        Host {
            session,
            queue: TrackQueue::new( files, false ),
            last_reported: None,
        }
    }


    /// Writes a silent mono WAV of the given length.
    fn write_wav( dir: &Path, name: &str, seconds: u32 ) -> PathBuf {
        let path = dir.join( name );
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create( &path, spec ).unwrap();
        for _ in 0..seconds * spec.sample_rate {
            writer.write_sample( 0i16 ).unwrap();
        }
        writer.finalize().unwrap();
        path
    }


    #[tokio::test( start_paused = true )]
    async fn test_hand_over_switches_decks() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_wav( dir.path(), "first.wav", 20 );
        let second = write_wav( dir.path(), "second.wav", 10 );
        let mut host = host( vec![ first, second.clone() ] );

        assert!( host.start().await.unwrap() );
        assert_eq!( host.session.active_index(), 0 );
        assert_eq!( host.session.duration(), 20.0 );
        assert!( host.session.is_playing() );

        tokio::time::advance( Duration::from_secs( 16 ) ).await;
        assert!( host.hand_over().await.unwrap() );

        assert_eq!( host.session.active_index(), 1 );
        assert_eq!( host.session.duration(), 10.0 );
        assert_eq!( host.session.source( 1 ), second.to_string_lossy() );
        assert!( host.session.is_playing() );

        let previous = host.session.get_deck( 0 ).unwrap();
        assert!( previous.is_paused() );
        assert_eq!( previous.current_time(), 0.0 );

        // Nothing left to hand over to
        assert!( !host.hand_over().await.unwrap() );
        assert_eq!( host.session.active_index(), 1 );
    }


    #[tokio::test( start_paused = true )]
    async fn test_failed_hand_over_keeps_previous_deck() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_wav( dir.path(), "first.wav", 20 );
        let missing = dir.path().join( "missing.wav" );
        let second = write_wav( dir.path(), "second.wav", 10 );
        let mut host = host( vec![ first, missing, second ] );

        assert!( host.start().await.unwrap() );
        tokio::time::advance( Duration::from_secs( 16 ) ).await;

        assert!( host.hand_over().await.is_err() );
        assert_eq!( host.session.active_index(), 0 );
        assert_eq!( host.session.duration(), 20.0 );
        assert!( host.session.is_playing() );

        let playing = host.session.get_deck( 0 ).unwrap();
        assert!( !playing.is_paused() );
        assert_eq!( playing.current_time(), 16.0 );

        assert!( host.hand_over().await.unwrap() );
        assert_eq!( host.session.active_index(), 1 );
        assert_eq!( host.session.duration(), 10.0 );
    }


    #[tokio::test( start_paused = true )]
    async fn test_advance_past_failures() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_wav( dir.path(), "first.wav", 20 );
        let missing = dir.path().join( "missing.wav" );
        let second = write_wav( dir.path(), "second.wav", 10 );
        let mut host = host( vec![ first, missing, second ] );

        assert!( host.start().await.unwrap() );
        assert!( host.advance_past_failures().await );
        assert_eq!( host.session.active_index(), 1 );
        assert_eq!( host.session.duration(), 10.0 );

        assert!( !host.advance_past_failures().await );
    }


    #[tokio::test( start_paused = true )]
    async fn test_start_skips_unplayable_tracks() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join( "missing.wav" );
        let second = write_wav( dir.path(), "second.wav", 10 );
        let mut host = host( vec![ missing, second.clone() ] );

        assert!( host.start().await.unwrap() );
        assert_eq!( host.session.active_index(), 0 );
        assert_eq!( host.session.source( 0 ), second.to_string_lossy() );
        assert_eq!( host.session.duration(), 10.0 );
        assert!( host.session.is_playing() );
    }


    #[tokio::test]
    async fn test_start_with_nothing_playable() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = host( vec![ dir.path().join( "a.wav" ), dir.path().join( "b.wav" ) ] );

        assert!( !host.start().await.unwrap() );
        assert!( !host.session.is_playing() );
    }


    #[test]
    fn test_format_time() {
        assert_eq!( format_time( 0.0 ), "0:00" );
        assert_eq!( format_time( 61.9 ), "1:01" );
        assert_eq!( format_time( 3599.0 ), "59:59" );
        assert_eq!( format_time( f64::NAN ), "0:00" );
    }


    #[test]
    fn test_track_finished() {
        let mut state = SessionState {
            is_playing: true,
            current_time: 180.0,
            duration: 180.0,
            ..SessionState::default()
        };
        assert!( track_finished( &state ) );

        state.overlap_started = true;
        assert!( !track_finished( &state ) );

        state.overlap_started = false;
        state.duration = 0.0;
        assert!( !track_finished( &state ) );

        state.duration = 180.0;
        state.is_playing = false;
        assert!( !track_finished( &state ) );
    }
}
