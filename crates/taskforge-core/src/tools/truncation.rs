//! Output truncation for tool results
//!
//! Two limits apply together (lines and bytes). Cuts land on line boundaries.

/// Which end of the text survives truncation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keep {
    /// File contents, fetched pages
    Head,
    /// Process output, where the latest lines matter
    Tail,
}

pub const MAX_OUTPUT_LINES: usize = 2000;
pub const MAX_OUTPUT_BYTES: usize = 50 * 1024;

#[derive(Debug)]
pub struct Truncated {
    pub text: String,
    pub lines_shown: usize,
    pub lines_total: usize,
    pub bytes_total: usize,
}

impl Truncated {
    pub fn was_truncated(&self) -> bool {
        self.lines_shown < self.lines_total || self.text.len() < self.bytes_total
    }

    /// Text plus a trailing notice when anything was dropped
    pub fn into_output(self) -> String {
        if !self.was_truncated() {
            return self.text;
        }
        format!(
            "{}\n[Output truncated: showed {} of {} lines ({}/{} bytes)]",
            self.text,
            self.lines_shown,
            self.lines_total,
            self.text.len(),
            self.bytes_total
        )
    }
}

pub fn truncate(text: &str, max_lines: usize, max_bytes: usize, keep: Keep) -> Truncated {
    let bytes_total = text.len();
    let lines: Vec<&str> = text.lines().collect();
    let lines_total = lines.len();

    if lines_total <= max_lines && bytes_total <= max_bytes {
        return Truncated {
            text: text.to_string(),
            lines_shown: lines_total,
            lines_total,
            bytes_total,
        };
    }

    let kept = match keep {
        Keep::Head => &lines[..lines_total.min(max_lines)],
        Keep::Tail => &lines[lines_total.saturating_sub(max_lines)..],
    };

    let mut selected: Vec<&str> = Vec::with_capacity(kept.len());
    let mut used = 0usize;
    let ordered: Box<dyn Iterator<Item = &&str>> = match keep {
        Keep::Head => Box::new(kept.iter()),
        Keep::Tail => Box::new(kept.iter().rev()),
    };
    for line in ordered {
        let cost = line.len() + usize::from(!selected.is_empty());
        if used + cost > max_bytes {
            break;
        }
        used += cost;
        selected.push(line);
    }
    if keep == Keep::Tail {
        selected.reverse();
    }

    Truncated {
        lines_shown: selected.len(),
        text: selected.join("\n"),
        lines_total,
        bytes_total,
    }
}

/// Convenience wrapper using the default limits
pub fn truncate_output(text: &str, keep: Keep) -> String {
    truncate(text, MAX_OUTPUT_LINES, MAX_OUTPUT_BYTES, keep).into_output()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_untouched() {
        let t = truncate("a\nb", 10, 100, Keep::Head);
        assert!(!t.was_truncated());
        assert_eq!(t.into_output(), "a\nb");
    }

    #[test]
    fn head_keeps_first_lines() {
        let t = truncate("1\n2\n3\n4", 2, 100, Keep::Head);
        assert_eq!(t.text, "1\n2");
        assert_eq!(t.lines_total, 4);
        assert!(t.into_output().contains("showed 2 of 4 lines"));
    }

    #[test]
    fn tail_keeps_last_lines() {
        let t = truncate("1\n2\n3\n4", 2, 100, Keep::Tail);
        assert_eq!(t.text, "3\n4");
    }

    #[test]
    fn byte_limit_cuts_on_line_boundary() {
        let text = "aaaa\nbbbb\ncccc";
        assert_eq!(truncate(text, 10, 9, Keep::Head).text, "aaaa\nbbbb");
        assert_eq!(truncate(text, 10, 9, Keep::Tail).text, "bbbb\ncccc");
    }
}
