//! Response sanitisation: recover bare markup from model output.
//!
//! Models are told to wrap their answer in a ```` ```html ```` block, and they
//! mostly do, sometimes with stray whitespace or a doubled marker. This stage
//! removes a leading fence marker (```` ```html ````, any case, or a bare
//! ```` ``` ````), a trailing ```` ``` ```` marker, and surrounding
//! whitespace.
//!
//! The pass repeats until the text stops changing. Each round either removes
//! at least one character or returns, so the loop terminates, and the result
//! is a fixed point: `sanitize(sanitize(x)) == sanitize(x)`.
//!
//! Only the outer edges are touched. The markup itself is never parsed.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_LEADING_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^```(?i:html)?").unwrap());

static RE_TRAILING_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```$").unwrap());

/// Strip code-fence markers and surrounding whitespace from raw model text.
pub fn sanitize(input: &str) -> String {
    let mut current = input.trim().to_string();
    loop {
        let next = strip_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

/// One round: leading marker, trailing marker, trim.
fn strip_once(input: &str) -> String {
    let s = RE_LEADING_FENCE.replace(input, "");
    let s = RE_TRAILING_FENCE.replace(&s, "");
    s.trim().to_string()
}

/// `true` when `s` starts or ends with a fence marker.
pub fn has_fence_marker(s: &str) -> bool {
    s.starts_with("```") || s.ends_with("```")
}
