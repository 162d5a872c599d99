//! Application settings management
//!
//! Persists the playback defaults so they do not have to be passed on
//! every run. Command-line flags take precedence.

use std::fs;
use std::path::PathBuf;

use serde::{ Deserialize, Serialize };

use crate::cli::Args;


/// Application settings.
#[derive( Debug, Clone, PartialEq, Serialize, Deserialize )]
#[serde( default )]
pub struct Settings {
    /// Seconds before the end of a track at which the next deck starts
    pub overlap_seconds: f64,

    /// Progress polling interval in milliseconds
    pub poll_interval_ms: u64,

    /// Restart the queue when it runs out
    pub repeat: bool,
}


impl Default for Settings {
    fn default() -> Self {
        Self {
            overlap_seconds: 5.0,
            poll_interval_ms: 100,
            repeat: false,
        }
    }
}


impl Settings {
    /// Returns the path to the settings file.
    fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map( |p| p.join( "duodeck" ).join( "settings.json" ) )
    }


    /// Loads settings from disk, or returns defaults if not found.
    pub fn load() -> Self {
        let path = match Self::settings_path() {
            Some( p ) => p,
            None => return Self::default(),
        };

        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string( &path ) {
            Ok( contents ) => Self::from_json( &contents ),
            Err( e ) => {
                tracing::warn!( "Failed to read settings: {}", e );
                Self::default()
            }
        }
    }


    /// Parses settings, falling back to defaults on malformed input.
    fn from_json( contents: &str ) -> Self {
        serde_json::from_str( contents ).unwrap_or_else( |e| {
            tracing::warn!( "Ignoring malformed settings: {}", e );
            Self::default()
        })
    }


    /// Saves settings to disk.
    pub fn save( &self ) {
        let path = match Self::settings_path() {
            Some( p ) => p,
            None => return,
        };

        // Create parent directory if needed
        if let Some( parent ) = path.parent() {
            if !parent.exists() {
                if let Err( e ) = fs::create_dir_all( parent ) {
                    tracing::warn!( "Failed to create settings directory: {}", e );
                    return;
                }
            }
        }

        match serde_json::to_string_pretty( self ) {
            Ok( json ) => {
                if let Err( e ) = fs::write( &path, json ) {
                    tracing::warn!( "Failed to save settings: {}", e );
                } else {
                    tracing::info!( "Settings saved to {:?}", path );
                }
            }
            Err( e ) => {
                tracing::warn!( "Failed to serialize settings: {}", e );
            }
        }
    }


    /// Overrides stored values with the ones given on the command line.
    pub fn apply_args( &mut self, args: &Args ) {
        if let Some( overlap ) = args.overlap {
            self.overlap_seconds = overlap;
        }
        if let Some( interval ) = args.poll_interval {
            self.poll_interval_ms = interval;
        }
        if args.repeat {
            self.repeat = true;
        }
    }
}


#[cfg( test )]
mod tests {
    use clap::Parser;

    use super::*;


    #[test]
    fn test_partial_json_uses_defaults() {
        let settings = Settings::from_json( r#"{ "overlap_seconds": 3.0 }"# );
        assert_eq!( settings.overlap_seconds, 3.0 );
        assert_eq!( settings.poll_interval_ms, 100 );
        assert!( !settings.repeat );
    }


    #[test]
    fn test_malformed_json_uses_defaults() {
        assert_eq!( Settings::from_json( "not json" ), Settings::default() );
    }


    #[test]
    fn test_args_override() {
        let mut settings = Settings { overlap_seconds: 3.0, poll_interval_ms: 50, repeat: false };
        let args = Args::try_parse_from( [ "duodeck", "-o", "7", "-r", "a.mp3" ] ).unwrap();

        settings.apply_args( &args );

        assert_eq!( settings.overlap_seconds, 7.0 );
        assert_eq!( settings.poll_interval_ms, 50 );
        assert!( settings.repeat );
    }
}
