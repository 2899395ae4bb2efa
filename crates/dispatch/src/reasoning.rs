//! Splits inline `<think>...</think>` markup out of model output.
//!
//! Only needed for models that have no separate reasoning channel.

pub const OPEN_MARKER: &str = "<think>";
pub const CLOSE_MARKER: &str = "</think>";

/// Split `text` into `(visible, reasoning)`.
///
/// Only the first closing marker is honored. Without a closing marker the
/// input comes back unchanged as the visible text with empty reasoning. A
/// closing marker with no opening marker treats everything before it as
/// reasoning, which is what some models emit when the template already
/// opened the block.
pub fn extract_reasoning(text: &str) -> (String, String) {
    let Some(close) = text.find(CLOSE_MARKER) else {
        return (text.to_string(), String::new());
    };

    let before = &text[..close];
    let after = &text[close + CLOSE_MARKER.len()..];

    match before.find(OPEN_MARKER) {
        Some(open) => {
            let prefix = &before[..open];
            let reasoning = &before[open + OPEN_MARKER.len()..];
            let visible = format!("{}{}", prefix.trim_end(), after.trim_start());
            (visible.trim().to_string(), reasoning.trim().to_string())
        }
        None => (after.trim().to_string(), before.trim().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_block() {
        assert_eq!(
            extract_reasoning("A<think>B</think>"),
            ("A".to_string(), "B".to_string())
        );
    }

    #[test]
    fn leading_block() {
        let (visible, reasoning) =
            extract_reasoning("<think>\nLet me think step by step.\n</think>\n\nThe answer is 4.");
        assert_eq!(visible, "The answer is 4.");
        assert_eq!(reasoning, "Let me think step by step.");
    }

    #[test]
    fn no_closing_marker_returns_input_unchanged() {
        let input = "  <think>unfinished thought ";
        assert_eq!(extract_reasoning(input), (input.to_string(), String::new()));
        assert_eq!(extract_reasoning("plain"), ("plain".to_string(), String::new()));
    }

    #[test]
    fn closing_marker_without_opening() {
        let (visible, reasoning) = extract_reasoning("pondering...</think>Done.");
        assert_eq!(visible, "Done.");
        assert_eq!(reasoning, "pondering...");
    }

    #[test]
    fn only_first_block_is_extracted() {
        let (visible, reasoning) = extract_reasoning("<think>one</think>x<think>two</think>y");
        assert_eq!(reasoning, "one");
        assert_eq!(visible, "x<think>two</think>y");
    }

    #[test]
    fn empty_block() {
        assert_eq!(
            extract_reasoning("<think></think>hello"),
            ("hello".to_string(), String::new())
        );
    }
}
