//! Deterministic truncation of oversized response bodies.
//!
//! Sizes are UTF-8 byte counts. When a body exceeds the limit, the stored
//! body is a prefix of the original followed by a marker that reports the
//! original size, the limit and the exact number of bytes dropped. The
//! marker's length depends on that last number, so the cut point is solved
//! as a small fixed point. The result never exceeds the limit.

/// A body after the truncation policy has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncated {
    pub body: String,
    pub truncated: bool,
}

/// Apply the `max_bytes` limit to `body`; `0` means unlimited.
pub fn truncate_body(body: String, max_bytes: usize) -> Truncated {
    let original = body.len();
    if max_bytes == 0 || original <= max_bytes {
        return Truncated {
            body,
            truncated: false,
        };
    }

    let stored = match fit_with_marker(&body, max_bytes) {
        Some((kept, marker)) => {
            let mut stored = String::with_capacity(kept + marker.len());
            stored.push_str(&body[..kept]);
            stored.push_str(&marker);
            stored
        }
        None => body[..floor_char_boundary(&body, max_bytes)].to_string(),
    };

    Truncated {
        body: stored,
        truncated: true,
    }
}

/// Render the marker for a body of `original` bytes cut to `limit`.
pub fn truncation_marker(original: usize, limit: usize, removed: usize) -> String {
    format!(
        "\n\n[TRUNCATED: Response size {} bytes exceeds limit of {} bytes. {} bytes removed.]",
        group_thousands(original),
        group_thousands(limit),
        group_thousands(removed)
    )
}

/// Find how many body bytes to keep so that prefix + marker fits the limit.
///
/// Returns `None` when the marker alone leaves no room for any content.
fn fit_with_marker(body: &str, limit: usize) -> Option<(usize, String)> {
    let original = body.len();
    let mut removed = original - limit;
    let mut marker = truncation_marker(original, limit, removed);

    // The digit count of `removed` changes the marker length by at most a few
    // bytes, so this settles within a handful of rounds.
    for _ in 0..8 {
        let available = limit.checked_sub(marker.len()).filter(|n| *n > 0)?;
        let kept = floor_char_boundary(body, available);
        if original - kept == removed {
            return Some((kept, marker));
        }
        removed = original - kept;
        marker = truncation_marker(original, limit, removed);
    }

    let available = limit.checked_sub(marker.len()).filter(|n| *n > 0)?;
    Some((floor_char_boundary(body, available), marker))
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut idx = index;
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
