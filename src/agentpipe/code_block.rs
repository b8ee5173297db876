//! Deterministic extraction of code from free-form model output.
//!
//! Models wrap code in markdown fences even when told not to. The rule applied
//! here is:
//!
//! 1. An opening fence is a line that starts, after at most three spaces, with
//!    a run of three or more backticks or tildes. The first such line wins and
//!    its exact run (e.g. ```` ``` ```` or ```` ```` ````) is the fence marker.
//!    Backticks or tildes further into a line never open a block, so banner
//!    comments like `# ~~~~~~` stay part of the code.
//! 2. The rest of the opening line is the info string; its first word, if any,
//!    is the language tag. If that line itself contains the marker again, the
//!    block is inline (```` ```print(1)``` ````), and a leading well-known
//!    language word is dropped (```` ```python print(1)``` ````).
//! 3. The block ends at the next line made of the same fence character, at
//!    least as long as the marker, with nothing after it. An unterminated block
//!    runs to the end of the text.
//! 4. No fence at all means the whole text is code.
//!
//! Later fenced blocks are ignored: first fence pair wins.
//!
//! ```
//! use agentpipe::code_block::extract_code;
//!
//! let reply = "Here you go:\n```python\nprint('hi')\n```\nEnjoy!";
//! assert_eq!(extract_code(reply), "print('hi')");
//!
//! assert_eq!(extract_code("print('bare')\n"), "print('bare')");
//! ```

/// Language words recognised in front of inline code.
const INLINE_LANGUAGES: &[&str] = &["python", "python3", "py", "bash", "sh", "shell", "text"];

/// A code block located in a model response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    /// Language tag from the opening fence (`"python"` for ```` ```python ````).
    pub language: Option<String>,
    /// The interior text, without fence markers.
    pub code: String,
    /// `false` when no fence was found and the whole input was taken as code.
    pub fenced: bool,
}

/// Fence found at the start of a line.
struct Fence<'a> {
    marker: &'a str,
    info: &'a str,
}

/// Locate the first fenced block in `text`, or take all of it as code.
pub fn parse_code_block(text: &str) -> CodeBlock {
    let mut lines = text.lines();
    let fence = loop {
        match lines.next() {
            Some(line) => {
                if let Some(fence) = opening_fence(line) {
                    break fence;
                }
            }
            None => {
                return CodeBlock {
                    language: None,
                    code: normalize(text),
                    fenced: false,
                }
            }
        }
    };

    if let Some(end) = fence.info.find(fence.marker) {
        return inline_block(&fence.info[..end]);
    }

    let language = fence
        .info
        .split_whitespace()
        .next()
        .map(|tag| tag.to_string());

    let interior: Vec<&str> = lines
        .take_while(|line| !is_closing_fence(line, fence.marker))
        .collect();

    CodeBlock {
        language,
        code: normalize(&interior.join("\n")),
        fenced: true,
    }
}

/// Convenience wrapper returning only the code text.
pub fn extract_code(text: &str) -> String {
    parse_code_block(text).code
}

/// Leading spaces (at most three) followed by a fence run, or `None`.
fn fence_run(line: &str) -> Option<(&str, &str)> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return None;
    }
    let rest = &line[indent..];
    let fence_char = match rest.as_bytes().first() {
        Some(&c) if c == b'`' || c == b'~' => c,
        _ => return None,
    };
    let run = rest.bytes().take_while(|&c| c == fence_char).count();
    if run < 3 {
        return None;
    }
    Some((&rest[..run], &rest[run..]))
}

fn opening_fence(line: &str) -> Option<Fence<'_>> {
    fence_run(line).map(|(marker, info)| Fence { marker, info })
}

fn is_closing_fence(line: &str, marker: &str) -> bool {
    match fence_run(line) {
        Some((run, rest)) => {
            run.as_bytes()[0] == marker.as_bytes()[0]
                && run.len() >= marker.len()
                && rest.trim().is_empty()
        }
        None => false,
    }
}

fn inline_block(content: &str) -> CodeBlock {
    let trimmed = content.trim();
    if let Some((word, rest)) = trimmed.split_once(char::is_whitespace) {
        if INLINE_LANGUAGES.contains(&word.to_ascii_lowercase().as_str()) {
            return CodeBlock {
                language: Some(word.to_string()),
                code: normalize(rest.trim_start()),
                fenced: true,
            };
        }
    }
    CodeBlock {
        language: None,
        code: normalize(content),
        fenced: true,
    }
}

/// Drop leading blank lines and trailing whitespace; keep first-line indentation.
fn normalize(code: &str) -> String {
    let mut rest = code;
    loop {
        match rest.find('\n') {
            Some(newline) if rest[..newline].trim().is_empty() => rest = &rest[newline + 1..],
            _ => break,
        }
    }
    rest.trim_end().to_string()
}
