//! Command-line argument parsing for Duodeck.

use std::path::PathBuf;

use clap::{ ArgAction, Parser };


/// Duodeck - plays a queue of tracks over two alternating decks.
#[derive( Parser, Debug )]
#[command( name = "duodeck" )]
#[command( version, about, long_about = None )]
pub struct Args {
    /// Seconds before the end of a track at which the next deck starts.
    #[arg( short, long, value_name = "SECONDS" )]
    pub overlap: Option<f64>,

    /// Progress polling interval in milliseconds.
    #[arg( long, value_name = "MS" )]
    pub poll_interval: Option<u64>,

    /// Start over from the first track when the queue runs out.
    #[arg( short, long )]
    pub repeat: bool,

    /// Write the effective settings back to the settings file.
    #[arg( long )]
    pub save_settings: bool,

    /// More log output (-v debug, -vv trace).
    #[arg( short, long, action = ArgAction::Count )]
    pub verbose: u8,

    /// Audio files to play, in order.
    #[arg( required = true )]
    pub files: Vec<PathBuf>,
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_files() {
        let args = Args::try_parse_from( [ "duodeck", "a.mp3", "b.flac" ] ).unwrap();
        assert_eq!( args.files, vec![ PathBuf::from( "a.mp3" ), PathBuf::from( "b.flac" ) ] );
        assert_eq!( args.overlap, None );
        assert_eq!( args.verbose, 0 );
        assert!( !args.repeat );
    }


    #[test]
    fn test_parse_options() {
        let args = Args::try_parse_from( [
            "duodeck", "-o", "8.5", "--poll-interval", "250", "-r", "-vv", "a.mp3",
        ]).unwrap();
        assert_eq!( args.overlap, Some( 8.5 ) );
        assert_eq!( args.poll_interval, Some( 250 ) );
        assert!( args.repeat );
        assert_eq!( args.verbose, 2 );
    }


    #[test]
    fn test_files_required() {
        assert!( Args::try_parse_from( [ "duodeck" ] ).is_err() );
    }
}
