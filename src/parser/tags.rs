//! Classification labels attached after extraction.
//!
//! The core never looks at tags; this is a separate rule set run over the
//! finished sections.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use super::content::SectionContent;

static FIGURE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bfigures?\s+[A-Z]?\d+").unwrap());
static TABLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\btables?\s+[A-Z]?\d+").unwrap());

pub fn apply(sections: &mut [SectionContent]) {
    let mut appendix_seqs: HashSet<usize> = HashSet::new();

    for section in sections.iter_mut() {
        let node = &section.node;
        let mut tags = Vec::new();

        if FIGURE_RE.is_match(&node.entry.title) {
            tags.push("figure");
        }
        if TABLE_RE.is_match(&node.entry.title) {
            tags.push("table");
        }

        let in_appendix = match node.entry.section_id.as_deref() {
            Some(id) => {
                id.starts_with("Appendix")
                    || id.starts_with("Annex")
                    || id.starts_with(|c: char| c.is_ascii_uppercase())
            }
            None => node.entry.title.starts_with("Appendix"),
        } || node.parent_seq.is_some_and(|p| appendix_seqs.contains(&p));
        if in_appendix {
            appendix_seqs.insert(node.seq());
            tags.push("appendix");
        } else if node.entry.section_id.is_none() {
            tags.push("front-matter");
        }

        section.tags = tags.into_iter().map(str::to_string).collect();
    }
}
