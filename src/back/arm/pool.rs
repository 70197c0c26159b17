//! The interned string pool backing the `.data` section.
//!
//! String literals (and the runtime routines' message strings) collapse by
//! content to a shared `msg_<n>` label.  Each pool entry renders as a
//! `.word <byte length>` prefix followed by the `.ascii` bytes, which is
//! the length-prefixed layout the print routines rely on.

use crate::common::{id, Id, Map};

use super::Frag;

/// Allocates and deduplicates data labels for one compilation.
#[derive(Default)]
pub struct StrPool {
    by_content: Map<String, Id>,
    next: u32,
}

impl StrPool {
    pub fn new() -> StrPool {
        StrPool::default()
    }

    /// Intern `s`, recording its data row in `out` and returning its
    /// label.  Interning the same content twice yields the same label and
    /// a single row.
    pub fn intern(&mut self, out: &mut Frag, s: &str) -> Id {
        let label = match self.by_content.get(s) {
            Some(label) => *label,
            None => {
                let label = id(format!("msg_{}", self.next));
                self.next += 1;
                self.by_content.insert(s.to_owned(), label);
                label
            }
        };
        out.data(
            label,
            vec![
                format!(".word {}", s.len()),
                format!(".ascii \"{}\"", escape(s)),
            ],
        );
        label
    }
}

/// Escape a string for a GAS `.ascii` directive.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\0' => out.push_str("\\0"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_content_shares_one_label_and_row() {
        let mut pool = StrPool::new();
        let mut out = Frag::new();
        let a = pool.intern(&mut out, "hello");
        let b = pool.intern(&mut out, "hello");
        assert_eq!(a, b);
        assert_eq!(out.data.len(), 1);
    }

    #[test]
    fn different_content_gets_fresh_labels() {
        let mut pool = StrPool::new();
        let mut out = Frag::new();
        let a = pool.intern(&mut out, "a");
        let b = pool.intern(&mut out, "b");
        assert_ne!(a, b);
        assert_eq!(*a, "msg_0");
        assert_eq!(*b, "msg_1");
    }

    #[test]
    fn rows_are_length_prefixed_and_escaped() {
        let mut pool = StrPool::new();
        let mut out = Frag::new();
        pool.intern(&mut out, "%d\0");
        assert_eq!(out.data[0].lines[0], ".word 3");
        assert_eq!(out.data[0].lines[1], ".ascii \"%d\\0\"");
    }
}
