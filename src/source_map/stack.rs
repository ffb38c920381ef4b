//! Stack-trace text parsing for V8, SpiderMonkey, and JSC formats

use regex::Regex;
use std::sync::OnceLock;

/// One parsed frame. Lines and columns are 1-based as browsers report them.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub function: Option<String>,
    pub url: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    /// The original text of the line, preserved for pass-through
    pub raw: String,
}

impl RawFrame {
    fn passthrough(raw: &str) -> Self {
        Self {
            function: None,
            url: None,
            line: None,
            column: None,
            raw: raw.to_string(),
        }
    }
}

fn v8_named() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*at\s+(.+?)\s+\((.+):(\d+):(\d+)\)\s*$").unwrap())
}

fn v8_anonymous() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*at\s+(.+?):(\d+):(\d+)\s*$").unwrap())
}

/// SpiderMonkey and JSC share `func@url:line:col`; the function part may be
/// empty for top-level frames.
fn gecko() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(.*?)@(.+):(\d+):(\d+)\s*$").unwrap())
}

/// Parse a multi-line stack string. Unmatched lines (including the leading
/// message line) become pass-through frames with no position.
pub fn parse_stack(stack: &str) -> Vec<RawFrame> {
    stack
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(parse_frame_line)
        .collect()
}

fn parse_frame_line(line: &str) -> RawFrame {
    if let Some(caps) = v8_named().captures(line) {
        return RawFrame {
            function: Some(caps[1].to_string()).filter(|f| f != "<anonymous>"),
            url: Some(caps[2].to_string()),
            line: caps[3].parse().ok(),
            column: caps[4].parse().ok(),
            raw: line.to_string(),
        };
    }
    if let Some(caps) = v8_anonymous().captures(line) {
        return RawFrame {
            function: None,
            url: Some(caps[1].to_string()),
            line: caps[2].parse().ok(),
            column: caps[3].parse().ok(),
            raw: line.to_string(),
        };
    }
    if let Some(caps) = gecko().captures(line) {
        let function = caps[1].trim();
        return RawFrame {
            function: (!function.is_empty()).then(|| function.to_string()),
            url: Some(caps[2].to_string()),
            line: caps[3].parse().ok(),
            column: caps[4].parse().ok(),
            raw: line.to_string(),
        };
    }
    RawFrame::passthrough(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_v8_named_frames() {
        let frames = parse_stack(
            "TypeError: x is not a function\n    at doThing (https://app.example/main.min.js:1:1000)\n    at https://app.example/main.min.js:1:2000",
        );
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].url, None); // message line passes through
        assert_eq!(frames[1].function.as_deref(), Some("doThing"));
        assert_eq!(frames[1].line, Some(1));
        assert_eq!(frames[1].column, Some(1000));
        assert_eq!(frames[2].function, None);
        assert_eq!(frames[2].column, Some(2000));
    }

    #[test]
    fn parses_spidermonkey_and_jsc_frames() {
        let frames = parse_stack(
            "doThing@https://app.example/main.min.js:1:1000\n@https://app.example/main.min.js:3:7\nglobal code@https://app.example/boot.js:2:1",
        );
        assert_eq!(frames[0].function.as_deref(), Some("doThing"));
        assert_eq!(frames[1].function, None);
        assert_eq!(frames[1].line, Some(3));
        assert_eq!(frames[2].function.as_deref(), Some("global code"));
    }

    #[test]
    fn anonymous_marker_is_dropped() {
        let frames =
            parse_stack("    at <anonymous> (https://app.example/main.min.js:4:2)");
        assert_eq!(frames[0].function, None);
        assert_eq!(frames[0].line, Some(4));
    }

    #[test]
    fn unmatched_lines_pass_through() {
        let frames = parse_stack("something strange happened");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].url, None);
        assert_eq!(frames[0].raw, "something strange happened");
    }
}
