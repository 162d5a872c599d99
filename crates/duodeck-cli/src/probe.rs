//! Track probing via Symphonia
//!
//! Reads only the container headers: enough to learn a track's length and
//! tags without decoding any audio.

use std::fs::File;
use std::path::Path;

use anyhow::{ anyhow, Context, Result };
use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{ MediaSourceStream, MediaSourceStreamOptions };
use symphonia::core::meta::{ MetadataOptions, StandardTagKey, Tag };
use symphonia::core::probe::Hint;


/// What a probe learned about a track.
#[derive( Debug, Clone, Default, PartialEq )]
pub struct TrackInfo {
    /// Length in seconds, if the container reports one.
    pub duration: Option<f64>,
    pub title: Option<String>,
    pub artist: Option<String>,
}


impl TrackInfo {
    /// Returns "Artist - Title", falling back to whatever is known.
    pub fn label( &self ) -> Option<String> {
        match ( &self.artist, &self.title ) {
            ( Some( artist ), Some( title ) ) => Some( format!( "{} - {}", artist, title ) ),
            ( None, Some( title ) ) => Some( title.clone() ),
            _ => None,
        }
    }
}


/// Probes an audio file.
///
/// Supports SMB/UNC paths transparently via std::fs.
pub fn probe( path: &Path ) -> Result<TrackInfo> {
    // Use larger buffer for network paths (SMB)
    let buffer_len = if path.starts_with( r"\\" ) {
        256 * 1024
    } else {
        64 * 1024
    };

    let file = File::open( path ).with_context( || format!( "Failed to open {:?}", path ) )?;
    let mss = MediaSourceStream::new( Box::new( file ), MediaSourceStreamOptions { buffer_len } );

    let mut hint = Hint::new();
    if let Some( ext ) = path.extension().and_then( |e| e.to_str() ) {
        hint.with_extension( ext );
    }

    let mut probed = symphonia::default::get_probe()
        .format( &hint, mss, &FormatOptions::default(), &MetadataOptions::default() )
        .map_err( |e| anyhow!( "Unsupported format {:?}: {}", path, e ) )?;

    let track = probed.format
        .tracks()
        .iter()
        .find( |t| t.codec_params.codec != CODEC_TYPE_NULL )
        .ok_or_else( || anyhow!( "No audio track in {:?}", path ) )?;

    let params = &track.codec_params;
    let duration = match ( params.n_frames, params.sample_rate ) {
        ( Some( frames ), Some( rate ) ) if rate > 0 => Some( frames as f64 / rate as f64 ),
        _ => None,
    };

    let mut info = TrackInfo { duration, ..TrackInfo::default() };

    // Probe metadata (ID3 tags, etc.) first, then the container's own
    if let Some( metadata ) = probed.metadata.get() {
        if let Some( revision ) = metadata.current() {
            extract_tags( &mut info, revision.tags() );
        }
    }
    if let Some( revision ) = probed.format.metadata().current() {
        extract_tags( &mut info, revision.tags() );
    }

    tracing::debug!( "Probed {:?}: {:?}", path, info );
    Ok( info )
}


fn extract_tags( info: &mut TrackInfo, tags: &[Tag] ) {
    for tag in tags {
        match tag.std_key {
            Some( StandardTagKey::TrackTitle ) if info.title.is_none() => {
                info.title = Some( tag.value.to_string() );
            }
            Some( StandardTagKey::Artist ) if info.artist.is_none() => {
                info.artist = Some( tag.value.to_string() );
            }
            _ => {}
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_missing_file() {
        assert!( probe( Path::new( "/nonexistent/track.mp3" ) ).is_err() );
    }


    #[test]
    fn test_label() {
        let info = TrackInfo {
            duration: None,
            title: Some( "Windowlicker".into() ),
            artist: Some( "Aphex Twin".into() ),
        };
        assert_eq!( info.label().as_deref(), Some( "Aphex Twin - Windowlicker" ) );

        let untitled = TrackInfo { artist: Some( "Unknown".into() ), ..TrackInfo::default() };
        assert_eq!( untitled.label(), None );
    }
}
