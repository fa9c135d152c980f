//! Hierarchy walker: a member's ancestry as a lazy sequence.
//!
//! Walks parent back-references from a member up to the root, skipping
//! synthetic "All" members (they contribute nothing to a flattened row but
//! do not stop the walk). The membership graph is a tree, so no cycle
//! detection is needed; a depth guard is kept anyway.

use cubist_types::{Member, MemberType};
use tracing::warn;

/// Upper bound on hierarchy depth; far beyond any real cube.
const MAX_WALK_DEPTH: usize = 64;

/// Lazy iterator over a member and its ancestors, "All" members skipped.
pub struct HierarchyWalk<'a> {
    current: Option<&'a Member>,
    depth: usize,
}

impl<'a> Iterator for HierarchyWalk<'a> {
    type Item = &'a Member;

    fn next(&mut self) -> Option<&'a Member> {
        while let Some(member) = self.current {
            if self.depth >= MAX_WALK_DEPTH {
                warn!(
                    member = %member.name,
                    "hierarchy walk exceeded depth guard, stopping"
                );
                self.current = None;
                return None;
            }
            self.depth += 1;
            self.current = member.parent.as_deref();
            if member.member_type != MemberType::All {
                return Some(member);
            }
        }
        None
    }
}

/// Walk `member` and its ancestry root-ward. Callers typically project each
/// yielded member to its `(level_unique_name, name)` pair.
pub fn hierarchy_walk(member: &Member) -> HierarchyWalk<'_> {
    HierarchyWalk {
        current: Some(member),
        depth: 0,
    }
}
