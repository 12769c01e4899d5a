//! Parser for CFG text.
//!
//! The format is line oriented, but braces may share a line with names and options, so
//! `A { X = 1 }` and the one-token-per-line style are equivalent.  Comments are whole lines
//! starting with `#` or `//`; they attach to the next option or section.
//!
//! Values run to the end of the line or to the first unescaped `}`.  A backslash escapes the
//! following character, so `\}`, `\{` and `\\` can appear in values.
//!
//! `name += value` appends to an existing list option.  Any other repeated name in a section
//! overwrites the earlier entry in place.

use log::trace;

use super::error::{self, Result};
use super::{validate_name, ConfigNode, Entry, Item};

/// A section that's been opened but not yet closed.
struct Frame {
    name: String,
    comment: String,
    line: usize,
    node: ConfigNode,
}

/// A section name that's been read, waiting for its opening brace.
struct PendingSection {
    name: String,
    comment: String,
    line: usize,
}

/// Parses CFG text into a tree.  The root of the text is an unnamed section.
pub fn parse<S: AsRef<str>>(text: S) -> Result<ConfigNode> {
    let mut parser = Parser::default();
    for (index, line) in text.as_ref().lines().enumerate() {
        parser.line(index + 1, line)?;
    }
    parser.finish()
}

#[derive(Default)]
struct Parser {
    root: ConfigNode,
    stack: Vec<Frame>,
    comments: Vec<String>,
    pending: Option<PendingSection>,
}

impl Parser {
    fn current(&mut self) -> &mut ConfigNode {
        match self.stack.last_mut() {
            Some(frame) => &mut frame.node,
            None => &mut self.root,
        }
    }

    fn take_comment(&mut self) -> String {
        let comment = self.comments.join("\n");
        self.comments.clear();
        comment
    }

    fn line(&mut self, line_no: usize, line: &str) -> Result<()> {
        // Trailing whitespace is left for read_value, which knows whether it was escaped.
        let trimmed = line.trim_start();
        if trimmed.trim_end().is_empty() {
            return Ok(());
        }
        if let Some(comment) = trimmed
            .strip_prefix('#')
            .or_else(|| trimmed.strip_prefix("//"))
        {
            self.comments.push(comment.trim().to_string());
            return Ok(());
        }

        let mut rest = trimmed;
        loop {
            rest = rest.trim_start();
            if rest.is_empty() {
                break;
            }
            if let Some(after) = rest.strip_prefix('{') {
                self.open(line_no)?;
                rest = after;
                continue;
            }
            if let Some(after) = rest.strip_prefix('}') {
                self.close(line_no)?;
                rest = after;
                continue;
            }
            if let Some(pending) = &self.pending {
                return error::ParseSnafu {
                    line: line_no,
                    msg: format!("expected '{{' after section name '{}'", pending.name),
                }
                .fail();
            }
            rest = self.statement(line_no, rest)?;
        }
        Ok(())
    }

    /// Handles an option or a section name at the start of `rest`, returning what's left of the
    /// line.
    fn statement<'a>(&mut self, line_no: usize, rest: &'a str) -> Result<&'a str> {
        let Some(pos) = rest.find(['=', '{', '}']) else {
            // A bare name is a section whose brace comes on a later line.
            let name = checked_name(line_no, rest)?;
            let comment = self.take_comment();
            self.pending = Some(PendingSection {
                name,
                comment,
                line: line_no,
            });
            return Ok("");
        };

        match rest.as_bytes()[pos] {
            b'=' => {
                let (raw_name, append) = match rest[..pos].strip_suffix('+') {
                    Some(name) => (name, true),
                    None => (&rest[..pos], false),
                };
                let name = checked_name(line_no, raw_name)?;
                let (value, remainder) = read_value(&rest[pos + 1..]);
                let comment = self.take_comment();
                trace!("Line {}: option '{}' = '{}'", line_no, name, value);
                let section = self.current();
                if append {
                    if !section.append_child(&name, value) && !comment.is_empty() {
                        if let Some(entry) = section.entry_mut(&name) {
                            entry.comment = comment;
                        }
                    }
                } else {
                    section.insert_entry(
                        name,
                        Entry {
                            comment,
                            item: Item::Value(value),
                        },
                    );
                }
                Ok(remainder)
            }
            b'{' => {
                let name = checked_name(line_no, &rest[..pos])?;
                let comment = self.take_comment();
                self.pending = Some(PendingSection {
                    name,
                    comment,
                    line: line_no,
                });
                Ok(&rest[pos..])
            }
            _ => error::ParseSnafu {
                line: line_no,
                msg: format!("'{}' has no value", rest[..pos].trim()),
            }
            .fail(),
        }
    }

    fn open(&mut self, line_no: usize) -> Result<()> {
        let pending = match self.pending.take() {
            Some(pending) => pending,
            None => {
                return error::ParseSnafu {
                    line: line_no,
                    msg: "'{' without a section name",
                }
                .fail()
            }
        };
        trace!("Line {}: opening section '{}'", line_no, pending.name);
        self.stack.push(Frame {
            name: pending.name,
            comment: pending.comment,
            line: pending.line,
            node: ConfigNode::new(),
        });
        Ok(())
    }

    fn close(&mut self, line_no: usize) -> Result<()> {
        if let Some(pending) = &self.pending {
            return error::ParseSnafu {
                line: line_no,
                msg: format!("section '{}' closed before it was opened", pending.name),
            }
            .fail();
        }
        let frame = match self.stack.pop() {
            Some(frame) => frame,
            None => {
                return error::ParseSnafu {
                    line: line_no,
                    msg: "unbalanced '}'",
                }
                .fail()
            }
        };
        // Comments between the last entry and the closing brace have nothing to attach to.
        self.comments.clear();
        self.current().insert_entry(
            frame.name,
            Entry {
                comment: frame.comment,
                item: Item::Section(frame.node),
            },
        );
        Ok(())
    }

    fn finish(mut self) -> Result<ConfigNode> {
        if let Some(pending) = self.pending.take() {
            return error::ParseSnafu {
                line: pending.line,
                msg: format!("section '{}' is never opened with '{{'", pending.name),
            }
            .fail();
        }
        if let Some(frame) = self.stack.pop() {
            return error::ParseSnafu {
                line: frame.line,
                msg: format!("unbalanced braces: section '{}' is never closed", frame.name),
            }
            .fail();
        }
        Ok(self.root)
    }
}

fn checked_name(line_no: usize, raw: &str) -> Result<String> {
    let name = raw.trim();
    if let Err(e) = validate_name(name) {
        return error::ParseSnafu {
            line: line_no,
            msg: e.to_string(),
        }
        .fail();
    }
    Ok(name.to_string())
}

/// Reads a value up to the end of the input or the first unescaped `}`, returning the unescaped
/// value and the unread remainder (starting at the brace, if any).
fn read_value(input: &str) -> (String, &str) {
    let mut end = input.len();
    let mut escaped = false;
    for (i, c) in input.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '}' {
            end = i;
            break;
        }
    }
    (unescape(&input[..end]), &input[end..])
}

/// Removes escapes and any unescaped whitespace at either end.
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut keep = 0;
    let mut chars = raw.trim_start().chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            // A trailing backslash has nothing to escape; keep it.
            out.push(chars.next().unwrap_or('\\'));
            keep = out.len();
        } else {
            out.push(c);
            if !c.is_whitespace() {
                keep = out.len();
            }
        }
    }
    out.truncate(keep);
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Error;

    fn line_of(err: Error) -> usize {
        match err {
            Error::Parse { line, .. } => line,
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn one_line_section() {
        let cfg = parse("A { X = 1 }").unwrap();
        assert_eq!(cfg.get_value("/A/X"), Some("1"));
    }

    #[test]
    fn block_style() {
        let cfg = parse(
            r"
A
{
  B
  {
    X = 1
  }
  Y = two words
}
",
        )
        .unwrap();
        assert_eq!(cfg.get_value("/A/B/X"), Some("1"));
        assert_eq!(cfg.get_value("/A/Y"), Some("two words"));
    }

    #[test]
    fn nested_on_one_line() {
        let cfg = parse("A { B { X = 1 } C = 2 }").unwrap();
        assert_eq!(cfg.get_value("/A/B/X"), Some("1"));
        assert_eq!(cfg.get_value("/A/C"), Some("2"));
    }

    #[test]
    fn comments_attach_to_next_entry() {
        let cfg = parse(
            r"
# first line
// second line
A
{
  # about X
  X = 1
  # dangling
}
",
        )
        .unwrap();
        assert_eq!(cfg.entry("A").unwrap().comment, "first line\nsecond line");
        let a = cfg.get_section("/A").unwrap();
        assert_eq!(a.entry("X").unwrap().comment, "about X");
    }

    #[test]
    fn urls_are_values() {
        let cfg = parse("Url = https://cs.example.org:9135/path#frag").unwrap();
        assert_eq!(
            cfg.get_value("Url"),
            Some("https://cs.example.org:9135/path#frag")
        );
    }

    #[test]
    fn escapes() {
        let cfg = parse(r"A { X = a\}b\{c\\d }").unwrap();
        assert_eq!(cfg.get_value("/A/X"), Some(r"a}b{c\d"));
    }

    #[test]
    fn empty_value() {
        let cfg = parse("X =\nY = ").unwrap();
        assert_eq!(cfg.get_value("X"), Some(""));
        assert_eq!(cfg.get_value("Y"), Some(""));
    }

    #[test]
    fn append() {
        let cfg = parse("L = a\nL += b\nL += c\nM += z").unwrap();
        assert_eq!(cfg.get_value("L"), Some("a, b, c"));
        assert_eq!(cfg.get_value("M"), Some("z"));
    }

    #[test]
    fn duplicates_overwrite_in_place() {
        let cfg = parse("X = 1\nY = 2\nX = 3\nS { A = 1 }\nS { B = 2 }").unwrap();
        assert_eq!(cfg.get_value("X"), Some("3"));
        assert_eq!(cfg.options().collect::<Vec<_>>(), vec!["X", "Y"]);
        assert_eq!(cfg.get_value("/S/A"), None);
        assert_eq!(cfg.get_value("/S/B"), Some("2"));
    }

    #[test]
    fn unbalanced_close() {
        assert_eq!(line_of(parse("A = 1\n}").unwrap_err()), 2);
    }

    #[test]
    fn never_closed() {
        assert_eq!(line_of(parse("A\n{\nX = 1\n").unwrap_err()), 1);
    }

    #[test]
    fn never_opened() {
        assert_eq!(line_of(parse("X = 1\nA\n").unwrap_err()), 2);
        assert_eq!(line_of(parse("A\nX = 1").unwrap_err()), 2);
    }

    #[test]
    fn brace_without_name() {
        assert_eq!(line_of(parse("{\n}").unwrap_err()), 1);
    }

    #[test]
    fn option_without_value() {
        assert_eq!(line_of(parse("A { X }").unwrap_err()), 1);
    }

    #[test]
    fn bad_names() {
        assert!(parse("= 1").is_err());
        assert!(parse("a/b = 1").is_err());
    }

    #[test]
    fn empty_input() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("\n  \n# only a comment\n").unwrap().is_empty());
    }
}
