use tracing::{debug, warn};

use super::toc::{segment_depth, TocEntry};
use crate::error::Diagnostic;

/// A TOC entry placed in the section tree. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionNode {
    pub entry: TocEntry,
    pub level: u32,
    pub parent_seq: Option<usize>,
    pub parent_id: Option<String>,
    pub full_path: String,
}

impl SectionNode {
    pub fn seq(&self) -> usize {
        self.entry.seq
    }

    /// Key used by children to refer to this node: the id, or the title for
    /// unnumbered entries.
    pub fn key(&self) -> &str {
        self.entry.section_id.as_deref().unwrap_or(&self.entry.title)
    }
}

#[derive(Debug)]
pub struct Hierarchy {
    pub nodes: Vec<SectionNode>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Level an entry claims: numbering depth when the id has one, the raw hint otherwise.
fn claimed_level(entry: &TocEntry, diagnostics: &mut Vec<Diagnostic>) -> u32 {
    let hint = entry.raw_level_hint.max(1);
    let Some(id) = entry.section_id.as_deref() else {
        return hint;
    };
    match segment_depth(id) {
        Some(segments) if segments != hint => {
            warn!(
                "entry #{} {}: hint {} vs numbering depth {}, using numbering",
                entry.seq, id, hint, segments
            );
            diagnostics.push(Diagnostic::LevelConflict {
                seq: entry.seq,
                section_id: id.to_string(),
                hint,
                segments,
            });
            segments
        }
        Some(segments) => segments,
        None => hint,
    }
}

/// Turn the flat, ordered entry list into a tree using a stack of open ancestors.
///
/// Sequence position is trusted over numbering: an entry's parent is the
/// nearest earlier open node with a smaller level, whatever its id says.
/// Level jumps with no open parent are clamped to `top + 1`.
pub fn build_hierarchy(entries: Vec<TocEntry>) -> Hierarchy {
    let mut nodes: Vec<SectionNode> = Vec::with_capacity(entries.len());
    let mut diagnostics = Vec::new();
    // (level, index into nodes)
    let mut stack: Vec<(u32, usize)> = Vec::new();

    for entry in entries {
        let claimed = claimed_level(&entry, &mut diagnostics);

        while stack.last().is_some_and(|&(level, _)| level >= claimed) {
            stack.pop();
        }

        let ceiling = stack.last().map_or(1, |&(level, _)| level + 1);
        let level = if claimed > ceiling {
            debug!("entry #{}: level {} repaired to {}", entry.seq, claimed, ceiling);
            diagnostics.push(Diagnostic::HierarchyRepair {
                seq: entry.seq,
                section_id: entry.section_id.clone(),
                claimed,
                repaired: ceiling,
            });
            ceiling
        } else {
            claimed
        };

        let parent = stack.last().map(|&(_, idx)| &nodes[idx]);
        let parent_seq = parent.map(SectionNode::seq);
        let parent_id = parent.map(|p| p.key().to_string());

        let full_path = entry.heading();
        stack.push((level, nodes.len()));
        nodes.push(SectionNode {
            entry,
            level,
            parent_seq,
            parent_id,
            full_path,
        });
    }

    Hierarchy { nodes, diagnostics }
}
