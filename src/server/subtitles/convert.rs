const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

/// detects gzip by magic bytes rather than trusting Content-Encoding, since
/// OpenSubtitles downloads are gzip-compressed regardless of what header is sent.
pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == GZIP_MAGIC[0] && bytes[1] == GZIP_MAGIC[1]
}

pub fn decompress_gzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    use std::io::Read;
    let mut decoder = flate2::read::GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// decodes subtitle bytes to text, falling back to Latin-1 when the bytes aren't
/// valid UTF-8 - OpenSubtitles serves a fair number of legacy-encoded tracks.
pub fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// converts SRT cue text to WebVTT: comma decimal separators become dots, cue
/// numbering lines are stripped, runs of 3+ blank lines collapse to one, and a
/// `WEBVTT` header is prepended. `<i>`/`<b>`/`<u>` tags pass through untouched.
/// if the input already starts with `WEBVTT` it's returned as-is.
pub fn srt_to_vtt(input: &str) -> String {
    let trimmed = input.trim_start_matches('\u{feff}');
    if trimmed.trim_start().starts_with("WEBVTT") {
        return trimmed.to_string();
    }

    let mut out = String::from("WEBVTT\n\n");
    let mut blank_run = 0usize;

    for line in trimmed.lines() {
        let is_cue_number = !line.is_empty() && line.trim().chars().all(|c| c.is_ascii_digit());
        if is_cue_number {
            continue;
        }

        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run >= 3 {
                continue;
            }
            out.push('\n');
            continue;
        }
        blank_run = 0;

        if line.contains("-->") {
            out.push_str(&line.replace(',', "."));
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_gzip_magic_bytes() {
        assert!(is_gzip(&[0x1F, 0x8B, 0x08, 0x00]));
        assert!(!is_gzip(b"WEBVTT"));
    }

    #[test]
    fn passthrough_when_already_vtt() {
        let vtt = "WEBVTT\n\n1\n00:00:01.000 --> 00:00:02.000\nhello\n";
        assert_eq!(srt_to_vtt(vtt), vtt);
    }

    #[test]
    fn converts_comma_timecodes_and_strips_cue_numbers() {
        let srt = "1\n00:00:01,000 --> 00:00:02,500\nHello there\n\n2\n00:00:03,000 --> 00:00:04,000\nBye\n";
        let vtt = srt_to_vtt(srt);
        assert!(vtt.starts_with("WEBVTT\n\n"));
        assert!(vtt.contains("00:00:01.000 --> 00:00:02.500"));
        assert!(!vtt.contains("\n1\n"));
        assert!(vtt.contains("Hello there"));
    }

    #[test]
    fn preserves_inline_formatting_tags() {
        let srt = "1\n00:00:01,000 --> 00:00:02,000\n<i>quiet voice</i>\n";
        let vtt = srt_to_vtt(srt);
        assert!(vtt.contains("<i>quiet voice</i>"));
    }

    #[test]
    fn collapses_long_runs_of_blank_lines() {
        let srt = "1\n00:00:01,000 --> 00:00:02,000\nfoo\n\n\n\n\n2\n00:00:03,000 --> 00:00:04,000\nbar\n";
        let vtt = srt_to_vtt(srt);
        assert!(!vtt.contains("\n\n\n\n"));
    }
}
