//! Serializer for CFG trees.  Output uses one entry per line, with braces on their own lines and
//! two spaces of indentation per level, so it reads the same as hand-written files.

use super::{ConfigNode, Item};
use std::fmt::Write;

const INDENT: &str = "  ";

/// Serializes a tree to CFG text.  The output is deterministic: entries appear in insertion
/// order, comments are written as `#` lines above their entry.
pub fn serialize(node: &ConfigNode) -> String {
    let mut out = String::new();
    write_section(&mut out, node, 0);
    out
}

fn write_section(out: &mut String, node: &ConfigNode, depth: usize) {
    let indent = INDENT.repeat(depth);
    for (name, entry) in node.entries() {
        if !entry.comment.is_empty() {
            for line in entry.comment.split('\n') {
                if line.is_empty() {
                    let _ = writeln!(out, "{}#", indent);
                } else {
                    let _ = writeln!(out, "{}# {}", indent, line);
                }
            }
        }
        match &entry.item {
            Item::Value(value) if value.is_empty() => {
                let _ = writeln!(out, "{}{} =", indent, name);
            }
            Item::Value(value) => {
                let _ = writeln!(out, "{}{} = {}", indent, name, escape(value));
            }
            Item::Section(section) => {
                let _ = writeln!(out, "{}{}", indent, name);
                let _ = writeln!(out, "{}{{", indent);
                write_section(out, section, depth + 1);
                let _ = writeln!(out, "{}}}", indent);
            }
        }
    }
}

/// Escapes braces and backslashes, plus whitespace at either end, which the parser would
/// otherwise trim.
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let last = value.char_indices().last().map(|(i, _)| i);
    for (i, c) in value.char_indices() {
        let edge_space = c.is_whitespace() && (i == 0 || Some(i) == last);
        if edge_space || matches!(c, '\\' | '{' | '}') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parse;

    #[test]
    fn layout() {
        let mut cfg = ConfigNode::new();
        cfg.set_value("/A/X", "1").unwrap();
        cfg.set_value("/A/B/Y", "two").unwrap();
        cfg.set_value("/Z", "").unwrap();
        cfg.set_comment("/A", "top\n\nsection").unwrap();
        assert_eq!(
            serialize(&cfg),
            "# top\n#\n# section\nA\n{\n  X = 1\n  B\n  {\n    Y = two\n  }\n}\nZ =\n"
        );
    }

    #[test]
    fn empty_tree() {
        assert_eq!(serialize(&ConfigNode::new()), "");
    }

    #[test]
    fn round_trip() {
        let text = r"
# the systems
Systems
{
  Hosts = alpha, beta
  Odd = a\}b\{c\\d
  Empty =
  Database
  {
    // port comment
    Port = 3306
  }
  EmptySection
  {
  }
}
Url = https://cs.example.org/a#b
";
        let first = parse(text).unwrap();
        let second = parse(serialize(&first)).unwrap();
        assert_eq!(first, second);
        assert_eq!(serialize(&first), serialize(&second));
    }

    #[test]
    fn programmatic_round_trip() {
        let mut cfg = ConfigNode::new();
        cfg.set_value("/Weird/Value", r"x}y{z\").unwrap();
        cfg.set_list("/Weird/List", &["a", "b"]).unwrap();
        cfg.create_section("/Weird/Nested/Deeper").unwrap();
        cfg.set_comment("/Weird/List", "list").unwrap();
        assert_eq!(parse(serialize(&cfg)).unwrap(), cfg);
    }

    #[test]
    fn edge_whitespace_round_trip() {
        let first = parse("A = \\ a\nB = b\\ \nC { D = \\  both \\  }\nE = \\ ").unwrap();
        assert_eq!(first.get_value("/A"), Some(" a"));
        assert_eq!(first.get_value("/B"), Some("b "));
        assert_eq!(first.get_value("/C/D"), Some("  both  "));
        assert_eq!(first.get_value("/E"), Some(" "));

        let text = serialize(&first);
        let second = parse(&text).unwrap();
        assert_eq!(first, second);
        assert_eq!(serialize(&second), text);
    }

    #[test]
    fn programmatic_edge_whitespace() {
        let mut cfg = ConfigNode::new();
        cfg.set_value("/Padded", "  x  ").unwrap();
        cfg.set_value("/Tab", "\ty").unwrap();
        assert_eq!(parse(serialize(&cfg)).unwrap(), cfg);
    }

    #[test]
    fn indented_comment_lines_round_trip() {
        let mut cfg = ConfigNode::new();
        cfg.set_value("/A", "1").unwrap();
        cfg.set_comment("/A", "  first\n    indented  \n\nlast").unwrap();
        assert_eq!(cfg.entries().next().unwrap().1.comment, "first\nindented\n\nlast");
        assert_eq!(parse(serialize(&cfg)).unwrap(), cfg);
    }
}
