//! Duodeck Core - Dual-deck playback controller
//!
//! This crate tracks two interchangeable playback decks, drives transport
//! operations against the active one, polls its progress, and fires a
//! one-shot overlap callback shortly before the active track ends so the
//! host can start the next deck.

pub mod config;
pub mod deck;
pub mod diagnostic;
pub mod progress;
pub mod session;
pub mod state;
pub mod transport;

#[cfg( test )]
mod testing;

pub use config::{ BoxFuture, OverlapCallback, OverlapError, SessionConfig };
pub use deck::{ DeckError, DeckHandle, DECK_COUNT };
pub use diagnostic::{ Diagnostic, DiagnosticSink };
pub use session::{ DeckSession, MountGuard, SessionError };
pub use state::SessionState;
