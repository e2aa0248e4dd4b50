//! Goto removal.
//!
//! The listing is scanned backwards. A `goto Lk;` is dropped when nothing
//! but closing braces of conditionals and empty label slots separates it
//! from `Lk:`, since control reaches the label anyway. Labels no remaining
//! goto refers to are hidden afterwards.

use std::collections::HashSet;

use super::emit::Chunk;

/// Remove redundant gotos from `chunks`, returning how many were removed.
pub(crate) fn remove_redundant_gotos(chunks: &mut Vec<Chunk>) -> usize {
    // Labels control falls into from the current scan position.
    let mut reached: HashSet<usize> = HashSet::new();
    let mut referenced: HashSet<usize> = HashSet::new();
    let mut redundant = Vec::new();

    for (i, chunk) in chunks.iter().enumerate().rev() {
        match *chunk {
            Chunk::Label { order, shown: true } => {
                reached.insert(order);
            }
            Chunk::Label { shown: false, .. } => {}
            Chunk::Close {
                conditional: true, ..
            } => {}
            Chunk::Goto { target, .. } => {
                if reached.contains(&target) {
                    redundant.push(i);
                } else {
                    referenced.insert(target);
                    reached.clear();
                }
            }
            Chunk::Close { .. } | Chunk::Text(_) => reached.clear(),
        }
    }

    for chunk in chunks.iter_mut() {
        if let Chunk::Label { order, shown } = chunk {
            if *shown && !referenced.contains(order) {
                *shown = false;
            }
        }
    }

    let removed = redundant.len();
    for i in redundant {
        // Indices were collected back to front, so earlier ones stay valid.
        chunks.remove(i);
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Chunk {
        Chunk::Text(s.to_string())
    }

    #[test]
    fn goto_over_closing_braces_is_removed() {
        let mut chunks = vec![
            text("\tif (bne) {\n"),
            Chunk::Goto {
                indent: 2,
                target: 3,
            },
            Chunk::Close {
                indent: 1,
                conditional: true,
            },
            Chunk::Label {
                order: 4,
                shown: false,
            },
            Chunk::Label {
                order: 3,
                shown: true,
            },
            text("\tnop\n"),
        ];
        assert_eq!(remove_redundant_gotos(&mut chunks), 1);
        assert_eq!(chunks.len(), 5);
        assert!(!chunks.iter().any(|c| matches!(c, Chunk::Goto { .. })));
        // Nothing jumps to L3 any more.
        assert!(chunks.contains(&Chunk::Label {
            order: 3,
            shown: false
        }));
    }

    #[test]
    fn goto_out_of_loop_body_is_kept() {
        let mut chunks = vec![
            Chunk::Goto {
                indent: 2,
                target: 3,
            },
            Chunk::Close {
                indent: 1,
                conditional: false,
            },
            Chunk::Label {
                order: 3,
                shown: true,
            },
            text("\tnop\n"),
        ];
        assert_eq!(remove_redundant_gotos(&mut chunks), 0);
        assert!(chunks.contains(&Chunk::Label {
            order: 3,
            shown: true
        }));
    }

    #[test]
    fn backward_goto_keeps_its_label() {
        let mut chunks = vec![
            Chunk::Label {
                order: 2,
                shown: true,
            },
            text("\tnop\n"),
            Chunk::Goto {
                indent: 1,
                target: 2,
            },
        ];
        assert_eq!(remove_redundant_gotos(&mut chunks), 0);
        assert_eq!(
            chunks[0],
            Chunk::Label {
                order: 2,
                shown: true
            }
        );
    }
}
