use std::sync::LazyLock;

use regex::Regex;

/// Matches a full entry carrying a `[HH:MM:SS]` timestamp prefix.
static ENTRY_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[(\d{2}:\d{2}:\d{2})\](.*)$").expect("valid regex"));

/// Matches every timestamp bracket inside a physical line; used to split
/// entries that the device concatenated without separators.
static ENTRY_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\d{2}:\d{2}:\d{2}\]").expect("valid regex"));

/// Width of the timestamp column in the reflowed output.
const TIMESTAMP_COLUMN: usize = 9;

/// Reflows a raw remote debug-log blob for display.
///
/// Entries arrive as `[HH:MM:SS]message` fragments, possibly several per
/// physical line and with mixed line endings. Line endings are normalized,
/// the blob is split at every boundary preceding a timestamp bracket as
/// well as at newlines, and each recognized entry is emitted as its
/// timestamp padded to a fixed column followed by the trimmed message.
/// Entries not matching the pattern pass through verbatim (trimmed); this
/// is a best-effort cosmetic reflow, not a strict parser.
pub fn format_device_log(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let text = raw.replace("\r\n", "\n").replace('\r', "\n");

    let mut formatted = Vec::new();
    for line in text.split('\n') {
        for entry in split_entries(line) {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            match ENTRY_PREFIX.captures(entry) {
                Some(caps) => {
                    let timestamp = &caps[1];
                    let message = caps[2].trim();
                    formatted.push(format!("{timestamp:<TIMESTAMP_COLUMN$}  {message}"));
                }
                None => formatted.push(entry.to_string()),
            }
        }
    }

    formatted.join("\n").trim().to_string()
}

/// Splits a physical line right before each timestamp bracket.
fn split_entries(line: &str) -> Vec<&str> {
    let mut bounds: Vec<usize> = ENTRY_BOUNDARY.find_iter(line).map(|m| m.start()).collect();
    if bounds.first() != Some(&0) {
        bounds.insert(0, 0);
    }
    bounds.push(line.len());

    bounds
        .windows(2)
        .map(|pair| &line[pair[0]..pair[1]])
        .filter(|entry| !entry.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn splits_concatenated_entries() {
        assert_eq!(
            format_device_log("[10:00:01]boot[10:00:02]ready"),
            "10:00:01   boot\n10:00:02   ready"
        );
    }

    #[test]
    fn pads_timestamps_to_a_fixed_column() {
        let formatted = format_device_log("[09:05:00]short");
        assert!(formatted.starts_with("09:05:00 "));
        assert_eq!(formatted, "09:05:00   short");
    }

    #[test]
    fn normalizes_line_endings() {
        assert_eq!(
            format_device_log("[10:00:01]one\r\n[10:00:02]two\r[10:00:03]three"),
            "10:00:01   one\n10:00:02   two\n10:00:03   three"
        );
    }

    #[test]
    fn passes_unrecognized_entries_through() {
        assert_eq!(
            format_device_log("  no timestamp here  \n[10:00:01]tagged"),
            "no timestamp here\n10:00:01   tagged"
        );
    }

    #[test]
    fn trims_entry_messages() {
        assert_eq!(format_device_log("[10:00:01]   spaced   "), "10:00:01   spaced");
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(format_device_log(""), "");
        assert_eq!(format_device_log("\n\n"), "");
    }

    #[test]
    fn malformed_brackets_pass_through() {
        assert_eq!(format_device_log("[1:2:3]oops"), "[1:2:3]oops");
    }
}
