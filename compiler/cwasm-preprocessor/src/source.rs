//! Early translation phases: line splicing and comment removal.
//!
//! Both transformations keep the number of lines intact so that directive line numbers in error
//! messages still refer to the text the user wrote.

/// Join lines ending in a backslash with their successor.
///
/// The newlines swallowed by a splice are re-emitted after the joined logical line.
pub fn splice_lines(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut swallowed = 0;
    let mut lines = text.split('\n').peekable();
    while let Some(line) = lines.next() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        match line.strip_suffix('\\') {
            Some(head) if lines.peek().is_some() => {
                output.push_str(head);
                swallowed += 1;
            }
            _ => {
                output.push_str(line);
                for _ in 0..swallowed {
                    output.push('\n');
                }
                swallowed = 0;
                if lines.peek().is_some() {
                    output.push('\n');
                }
            }
        }
    }
    output
}

/// Replace comments by a single space, keeping the newlines of block comments.
///
/// String and character literals are copied verbatim so that `"//"` survives.
pub fn strip_comments(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' | '\'' => {
                output.push(ch);
                while let Some(inner) = chars.next() {
                    output.push(inner);
                    match inner {
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                output.push(escaped);
                            }
                        }
                        '\n' => break,
                        c if c == ch => break,
                        _ => {}
                    }
                }
            }
            '/' if chars.peek() == Some(&'/') => {
                while chars.peek().is_some_and(|c| *c != '\n') {
                    chars.next();
                }
                output.push(' ');
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                output.push(' ');
                let mut previous = '\0';
                for inner in chars.by_ref() {
                    if previous == '*' && inner == '/' {
                        break;
                    }
                    if inner == '\n' {
                        output.push('\n');
                    }
                    previous = inner;
                }
            }
            _ => output.push(ch),
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use crate::source::{splice_lines, strip_comments};

    #[test]
    fn test_splice_keeps_line_count() {
        let text = "#define A 1 + \\\n  2\nint x;";
        let spliced = splice_lines(text);
        assert_eq!(spliced, "#define A 1 +   2\n\nint x;");
        assert_eq!(spliced.lines().count(), text.lines().count());
    }

    #[test]
    fn test_strip_line_and_block_comments() {
        assert_eq!(strip_comments("a // b\nc"), "a  \nc");
        assert_eq!(strip_comments("a /* b\n c */ d"), "a  \n d");
        assert_eq!(strip_comments("\"// not a comment\""), "\"// not a comment\"");
        assert_eq!(strip_comments("'\\''/**/x"), "'\\'' x");
    }
}
