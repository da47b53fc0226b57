use std::fmt;

/// One parsed command line: the stage argument vectors, in pipe order, and
/// whether the line ended with the background marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub stages: Vec<Vec<String>>,
    pub background: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    UnterminatedQuote,
    EmptyStage,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseError::UnterminatedQuote => write!(f, "unterminated quote"),
            ParseError::EmptyStage => write!(f, "missing command in pipeline"),
        }
    }
}

/// Split a line into tokens and extract the background marker.
///
/// Whitespace between tokens collapses; a trailing newline counts as
/// whitespace. A token opening with `'` or `"` runs to the matching quote
/// (stripped), so it may contain whitespace and `|`. The background flag is
/// set only when the last token is exactly `&`, and that token is removed.
pub fn tokenize(line: &str) -> Result<(Vec<String>, bool), ParseError> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '\'' || c == '"' {
            chars.next();
            let mut token = String::new();
            let mut closed = false;
            for q in &mut chars {
                if q == c {
                    closed = true;
                    break;
                }
                token.push(q);
            }
            if !closed {
                return Err(ParseError::UnterminatedQuote);
            }
            if !token.is_empty() {
                tokens.push(token);
            }
        } else {
            let mut token = String::new();
            while let Some(&q) = chars.peek() {
                if q.is_whitespace() {
                    break;
                }
                token.push(q);
                chars.next();
            }
            tokens.push(token);
        }
    }

    let background = tokens.last().map(|t| t == "&").unwrap_or(false);
    if background {
        tokens.pop();
    }
    Ok((tokens, background))
}

/// Split on unquoted `|` only; tokenize() flags any quote left open.
fn split_stages(line: &str) -> Vec<&str> {
    let mut stages = Vec::new();
    let mut start = 0;
    let mut quote: Option<char> = None;
    for (i, c) in line.char_indices() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => quote = Some(c),
                '|' => {
                    stages.push(&line[start..i]);
                    start = i + 1;
                }
                _ => {}
            },
        }
    }
    stages.push(&line[start..]);
    stages
}

/// Build the full pipeline for one input line.
///
/// `Ok(None)` means a blank line to ignore. A pipeline with an empty stage
/// (`a |`, `| a`) is a reported error, never a crash. The background flag is
/// taken from the final stage only.
pub fn parse_line(line: &str) -> Result<Option<Pipeline>, ParseError> {
    let parts = split_stages(line);
    let last = parts.len() - 1;
    let mut stages = Vec::with_capacity(parts.len());
    let mut background = false;
    for (i, part) in parts.iter().enumerate() {
        let (tokens, bg) = tokenize(part)?;
        if i == last {
            background = bg;
        }
        stages.push(tokens);
    }
    if stages.len() == 1 && stages[0].is_empty() {
        return Ok(None);
    }
    if stages.iter().any(|s| s.is_empty()) {
        return Err(ParseError::EmptyStage);
    }
    Ok(Some(Pipeline { stages, background }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_collapses_whitespace() {
        let (tokens, bg) = tokenize("  ls   -l    /tmp \n").unwrap();
        assert_eq!(tokens, vec!["ls", "-l", "/tmp"]);
        assert!(!bg);
    }

    #[test]
    fn tokenize_background_marker() {
        let (tokens, bg) = tokenize("ls -l &\n").unwrap();
        assert_eq!(tokens, vec!["ls", "-l"]);
        assert!(bg);
    }

    #[test]
    fn tokenize_background_extraction_is_idempotent() {
        let (tokens, bg) = tokenize("sleep 5 &").unwrap();
        assert!(bg);
        let rejoined = tokens.join(" ");
        let (again, bg2) = tokenize(&rejoined).unwrap();
        assert_eq!(tokens, again);
        assert!(!bg2);
    }

    #[test]
    fn tokenize_single_quotes() {
        let (tokens, _) = tokenize("echo 'a b' c").unwrap();
        assert_eq!(tokens, vec!["echo", "a b", "c"]);
    }

    #[test]
    fn tokenize_double_quotes_keep_single() {
        let (tokens, _) = tokenize("echo \"don't stop\" now").unwrap();
        assert_eq!(tokens, vec!["echo", "don't stop", "now"]);
    }

    #[test]
    fn tokenize_unterminated_quote_is_error() {
        assert_eq!(tokenize("echo 'abc").unwrap_err(), ParseError::UnterminatedQuote);
    }

    #[test]
    fn tokenize_ampersand_only_counts_when_last() {
        let (tokens, bg) = tokenize("echo & now").unwrap();
        assert_eq!(tokens, vec!["echo", "&", "now"]);
        assert!(!bg);
    }

    #[test]
    fn tokenize_blank_line_yields_nothing() {
        let (tokens, bg) = tokenize("   \n").unwrap();
        assert!(tokens.is_empty());
        assert!(!bg);
    }

    #[test]
    fn parse_line_splits_stages() {
        let p = parse_line("a | b | c").unwrap().unwrap();
        assert_eq!(p.stages, vec![vec!["a"], vec!["b"], vec!["c"]]);
        assert!(!p.background);
    }

    #[test]
    fn parse_line_trailing_pipe_is_error() {
        assert_eq!(parse_line("a |").unwrap_err(), ParseError::EmptyStage);
    }

    #[test]
    fn parse_line_leading_pipe_is_error() {
        assert_eq!(parse_line("| a").unwrap_err(), ParseError::EmptyStage);
    }

    #[test]
    fn parse_line_double_pipe_is_error() {
        assert_eq!(parse_line("a || b").unwrap_err(), ParseError::EmptyStage);
    }

    #[test]
    fn parse_line_quoted_pipe_is_not_a_separator() {
        let p = parse_line("echo 'a | b'").unwrap().unwrap();
        assert_eq!(p.stages, vec![vec!["echo", "a | b"]]);
    }

    #[test]
    fn parse_line_background_comes_from_final_stage() {
        let p = parse_line("a | b &").unwrap().unwrap();
        assert!(p.background);
        assert_eq!(p.stages[1], vec!["b"]);
    }

    #[test]
    fn parse_line_blank_is_none() {
        assert!(parse_line("  \n").unwrap().is_none());
    }

    #[test]
    fn parse_line_lone_ampersand_is_none() {
        assert!(parse_line(" & \n").unwrap().is_none());
    }
}
