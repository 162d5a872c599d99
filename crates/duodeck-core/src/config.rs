//! Session configuration
//!
//! Accepted once at construction. Everything has a default, so
//! `SessionConfig::default()` yields a working session with no overlap
//! callback and no diagnostic sink.

use std::error::Error;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::diagnostic::{ Diagnostic, DiagnosticSink };


/// Default number of seconds before the end of a track at which the
/// overlap callback fires.
pub const DEFAULT_OVERLAP_SECONDS: f64 = 5.0;

/// Default progress polling period.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis( 100 );

/// Shortest accepted polling period.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis( 1 );


/// Boxed, sendable future.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Error returned by an overlap callback.
pub type OverlapError = Box<dyn Error + Send + Sync>;

/// Callback invoked once per approach to the end of the active track.
pub type OverlapCallback = Arc<dyn Fn() -> BoxFuture<Result<(), OverlapError>> + Send + Sync>;


/// Configuration for a `DeckSession`.
#[derive( Clone )]
pub struct SessionConfig {
    /// Seconds before the end of the active track at which to trigger.
    pub overlap_seconds: f64,

    /// Period of the progress polling timer.
    pub poll_interval: Duration,

    /// Optional overlap callback.
    pub on_overlap: Option<OverlapCallback>,

    /// Optional diagnostic sink. Diagnostics always reach `tracing`.
    pub logger: Option<DiagnosticSink>,
}


impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            overlap_seconds: DEFAULT_OVERLAP_SECONDS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            on_overlap: None,
            logger: None,
        }
    }
}


impl SessionConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }


    /// Sets the overlap window length in seconds.
    pub fn with_overlap_seconds( mut self, seconds: f64 ) -> Self {
        self.overlap_seconds = seconds;
        self
    }


    /// Sets the polling period. Periods under 1 ms are clamped.
    pub fn with_poll_interval( mut self, interval: Duration ) -> Self {
        self.poll_interval = interval.max( MIN_POLL_INTERVAL );
        self
    }


    /// Sets the overlap callback.
    ///
    /// @param callback - Called with no arguments; the returned future is
    ///                   awaited before the overlap guard is released
    pub fn on_overlap<F, Fut>( mut self, callback: F ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), OverlapError>> + Send + 'static,
    {
        let callback: OverlapCallback = Arc::new( move || Box::pin( callback() ) as BoxFuture<_> );
        self.on_overlap = Some( callback );
        self
    }


    /// Sets the diagnostic sink.
    pub fn with_logger<F>( mut self, logger: F ) -> Self
    where
        F: Fn( &Diagnostic ) + Send + Sync + 'static,
    {
        let logger: DiagnosticSink = Arc::new( logger );
        self.logger = Some( logger );
        self
    }
}


impl fmt::Debug for SessionConfig {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        f.debug_struct( "SessionConfig" )
            .field( "overlap_seconds", &self.overlap_seconds )
            .field( "poll_interval", &self.poll_interval )
            .field( "on_overlap", &self.on_overlap.is_some() )
            .field( "logger", &self.logger.is_some() )
            .finish()
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!( config.overlap_seconds, 5.0 );
        assert_eq!( config.poll_interval, Duration::from_millis( 100 ) );
        assert!( config.on_overlap.is_none() );
        assert!( config.logger.is_none() );
    }


    #[test]
    fn test_zero_interval_clamped() {
        let config = SessionConfig::new().with_poll_interval( Duration::ZERO );
        assert_eq!( config.poll_interval, MIN_POLL_INTERVAL );
    }


    #[test]
    fn test_builder() {
        let config = SessionConfig::new()
            .with_overlap_seconds( 8.0 )
            .on_overlap( || async { Ok::<(), OverlapError>(()) } )
            .with_logger( |_| {} );

        assert_eq!( config.overlap_seconds, 8.0 );
        assert!( config.on_overlap.is_some() );
        assert!( config.logger.is_some() );
    }
}
