//! Text helpers shared by the extractor, the signature registry and the
//! oracle prompt builder.

/// Remove comments and docstrings from analysis code.
///
/// Handles `#` line comments, `//` comments that start a line, `/* */`
/// blocks and triple-quoted strings in docstring position (first thing on a
/// line). String literals are copied through untouched so that `#` or `//`
/// inside them survive.
pub fn strip_comments(code: &str) -> String {
    let chars: Vec<char> = code.chars().collect();
    let mut out = String::with_capacity(code.len());
    let mut i = 0;
    let mut line_blank = true;

    let starts_with = |i: usize, pat: &str| -> bool {
        let mut j = i;
        for p in pat.chars() {
            if chars.get(j) != Some(&p) {
                return false;
            }
            j += 1;
        }
        true
    };

    while i < chars.len() {
        let c = chars[i];

        if c == '\n' {
            out.push(c);
            line_blank = true;
            i += 1;
            continue;
        }

        let triple = if starts_with(i, "\"\"\"") {
            Some("\"\"\"")
        } else if starts_with(i, "'''") {
            Some("'''")
        } else {
            None
        };

        if let Some(delim) = triple {
            let end = find_from(&chars, i + 3, delim).map_or(chars.len(), |e| e + 3);
            if !line_blank {
                out.extend(&chars[i..end]);
            }
            i = end;
            continue;
        }

        match c {
            '"' | '\'' => {
                let end = string_end(&chars, i, c);
                out.extend(&chars[i..end]);
                line_blank = false;
                i = end;
            }
            '#' => {
                i = line_end(&chars, i);
            }
            '/' if line_blank && starts_with(i, "//") => {
                i = line_end(&chars, i);
            }
            '/' if starts_with(i, "/*") => {
                i = find_from(&chars, i + 2, "*/").map_or(chars.len(), |e| e + 2);
            }
            _ => {
                if !c.is_whitespace() {
                    line_blank = false;
                }
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// Truncate to at most `max_chars` characters, marking the cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}\n... [truncated]", &text[..byte_idx]),
        None => text.to_string(),
    }
}

fn find_from(chars: &[char], start: usize, pat: &str) -> Option<usize> {
    let pat: Vec<char> = pat.chars().collect();
    if start > chars.len() {
        return None;
    }
    chars[start..]
        .windows(pat.len())
        .position(|w| w == pat.as_slice())
        .map(|p| p + start)
}

fn line_end(chars: &[char], start: usize) -> usize {
    chars[start..]
        .iter()
        .position(|&c| c == '\n')
        .map_or(chars.len(), |p| p + start)
}

/// Index just past the closing quote of a single-line string literal.
fn string_end(chars: &[char], start: usize, quote: char) -> usize {
    let mut j = start + 1;
    while j < chars.len() {
        match chars[j] {
            '\\' => j += 2,
            '\n' => return j,
            c if c == quote => return j + 1,
            _ => j += 1,
        }
    }
    chars.len()
}
