//! Diagnostic events
//!
//! Every diagnostic goes to `tracing` and, when configured, to a caller
//! supplied sink.

use std::fmt;
use std::sync::Arc;


/// Caller supplied diagnostic sink.
pub type DiagnosticSink = Arc<dyn Fn( &Diagnostic ) + Send + Sync>;


/// Diagnostic emitted by the session.
#[derive( Debug, Clone, PartialEq )]
pub enum Diagnostic {
    /// A deck index outside the slot range was coerced to 0.
    InvalidDeckIndex { index: usize },

    /// Toggle started the active deck.
    Play { index: usize },

    /// Toggle paused both decks.
    Pause,

    /// The active deck is within the near-end window.
    NearEnd { current_time: f64, duration: f64, remaining: f64 },

    /// The overlap callback is about to run.
    OverlapTriggered { index: usize },
}


impl fmt::Display for Diagnostic {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        match self {
            Diagnostic::InvalidDeckIndex { index } => {
                write!( f, "invalid deck index {}, defaulting to 0", index )
            }
            Diagnostic::Play { index } => write!( f, "play deck {}", index ),
            Diagnostic::Pause => write!( f, "pause" ),
            Diagnostic::NearEnd { current_time, duration, remaining } => write!(
                f,
                "near end: {:.2} / {:.2} ({:.2} remaining)",
                current_time,
                duration,
                remaining
            ),
            Diagnostic::OverlapTriggered { index } => {
                write!( f, "overlap trigger reached on deck {}", index )
            }
        }
    }
}


/// Fans diagnostics out to tracing and the optional sink.
#[derive( Clone, Default )]
pub(crate) struct Diagnostics {
    sink: Option<DiagnosticSink>,
}


impl Diagnostics {
    pub(crate) fn new( sink: Option<DiagnosticSink> ) -> Self {
        Self { sink }
    }


    pub(crate) fn emit( &self, diagnostic: Diagnostic ) {
        match diagnostic {
            Diagnostic::InvalidDeckIndex { .. } => tracing::warn!( "{}", diagnostic ),
            Diagnostic::NearEnd { .. } => tracing::debug!( "{}", diagnostic ),
            _ => tracing::info!( "{}", diagnostic ),
        }

        if let Some( ref sink ) = self.sink {
            sink( &diagnostic );
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use std::sync::Mutex;


    #[test]
    fn test_near_end_two_decimals() {
        let d = Diagnostic::NearEnd { current_time: 95.5, duration: 100.0, remaining: 4.5 };
        assert_eq!( d.to_string(), "near end: 95.50 / 100.00 (4.50 remaining)" );
    }


    #[test]
    fn test_invalid_index_message() {
        let d = Diagnostic::InvalidDeckIndex { index: 7 };
        assert_eq!( d.to_string(), "invalid deck index 7, defaulting to 0" );
    }


    #[test]
    fn test_emit_reaches_sink() {
        let seen = Arc::new( Mutex::new( Vec::new() ) );
        let seen_clone = Arc::clone( &seen );
        let sink: DiagnosticSink = Arc::new( move |d: &Diagnostic| {
            seen_clone.lock().unwrap().push( d.clone() );
        });
        let diagnostics = Diagnostics::new( Some( sink ) );

        diagnostics.emit( Diagnostic::Pause );

        assert_eq!( *seen.lock().unwrap(), vec![ Diagnostic::Pause ] );
    }


    #[test]
    fn test_emit_without_sink() {
        Diagnostics::default().emit( Diagnostic::Pause );
    }
}
