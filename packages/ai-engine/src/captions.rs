/// WebVTT caption formatting for transcription segments
use serde::{Deserialize, Serialize};

/// One timed piece of a transcription, times in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Format seconds as `HH:MM:SS.mmm`
///
/// Negative or non-finite input is clamped to zero.
pub fn format_timestamp(seconds: f64) -> String {
    let total_ms = if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1000.0).round() as u64
    } else {
        0
    };

    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;

    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, secs, millis)
}

/// Render segments as a WebVTT document
///
/// Every cue is a timestamp line followed by the trimmed text and a blank line.
pub fn to_webvtt(segments: &[Segment]) -> String {
    let mut out = String::from("WEBVTT\n\n");

    for segment in segments {
        out.push_str(&format_timestamp(segment.start));
        out.push_str(" --> ");
        out.push_str(&format_timestamp(segment.end));
        out.push('\n');
        out.push_str(segment.text.trim());
        out.push_str("\n\n");
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_segment() {
        let segments = vec![Segment {
            start: 0.0,
            end: 1.5,
            text: "Hi".to_string(),
        }];

        assert_eq!(
            to_webvtt(&segments),
            "WEBVTT\n\n00:00:00.000 --> 00:00:01.500\nHi\n\n"
        );
    }

    #[test]
    fn test_empty_transcription_has_header_only() {
        assert_eq!(to_webvtt(&[]), "WEBVTT\n\n");
    }

    #[test]
    fn test_text_is_trimmed() {
        let segments = vec![Segment {
            start: 61.25,
            end: 3725.004,
            text: "  Welcome back \n".to_string(),
        }];

        assert_eq!(
            to_webvtt(&segments),
            "WEBVTT\n\n00:01:01.250 --> 01:02:05.004\nWelcome back\n\n"
        );
    }

    #[test]
    fn test_timestamp_rounding_and_clamping() {
        assert_eq!(format_timestamp(2.3), "00:00:02.300");
        assert_eq!(format_timestamp(-4.0), "00:00:00.000");
        assert_eq!(format_timestamp(f64::NAN), "00:00:00.000");
    }
}
