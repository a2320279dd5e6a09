#![forbid(unsafe_code)]

//! Minimal edit scripts between two versions of a sequence.
//!
//! [`calculate_splices`] diffs an old and a current sequence of [`Value`]s
//! and returns the [`Splice`]s that turn the old one into the current one.
//! Elements match by [`Value::same`] (reference identity for containers),
//! never by deep equality.
//!
//! # Algorithm
//!
//! 1. Trim the shared prefix and shared suffix.
//! 2. If only one side has remaining elements, emit a single pure insertion
//!    or pure removal.
//! 3. Otherwise fill an edit-distance table over the remaining window (only
//!    insertions and deletions cost 1; a match costs 0) and walk it back from
//!    the bottom-right corner. At each step the cheapest of diagonal, up and
//!    left is taken, preferring the diagonal on ties, then deletion when it is
//!    strictly cheaper than insertion. The resulting operation list is merged
//!    into contiguous splices.
//!
//! # Invariants
//!
//! 1. Splices are ordered by `index` and do not overlap.
//! 2. `index` is expressed in coordinates of the *current* sequence.
//! 3. `apply_splices(old, current, calculate_splices(current, old))` yields
//!    `current` (element-wise [`Value::same`]).
//! 4. Deterministic: identical inputs give identical splices.

use crate::value::Value;

/// One contiguous edit: at `index`, `removed` elements were replaced by
/// `added_count` elements of the current sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Splice {
    pub index: usize,
    pub removed: Vec<Value>,
    pub added_count: usize,
}

impl Splice {
    #[must_use]
    pub fn new(index: usize, removed: Vec<Value>, added_count: usize) -> Self {
        Self {
            index,
            removed,
            added_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit {
    Leave,
    Update,
    Add,
    Delete,
}

/// Compute the splices that transform `old` into `current`.
#[must_use]
pub fn calculate_splices(current: &[Value], old: &[Value]) -> Vec<Splice> {
    let min_len = current.len().min(old.len());
    let prefix = shared_prefix(current, old, min_len);
    let suffix = shared_suffix(current, old, min_len - prefix);

    let cur_start = prefix;
    let cur_end = current.len() - suffix;
    let old_start = prefix;
    let old_end = old.len() - suffix;

    if cur_start == cur_end && old_start == old_end {
        return Vec::new();
    }
    if cur_start == cur_end {
        return vec![Splice::new(cur_start, old[old_start..old_end].to_vec(), 0)];
    }
    if old_start == old_end {
        return vec![Splice::new(cur_start, Vec::new(), cur_end - cur_start)];
    }

    let ops = edit_operations(&current[cur_start..cur_end], &old[old_start..old_end]);

    let mut splices = Vec::new();
    let mut pending: Option<Splice> = None;
    let mut index = cur_start;
    let mut old_index = old_start;
    for op in ops {
        match op {
            Edit::Leave => {
                if let Some(splice) = pending.take() {
                    splices.push(splice);
                }
                index += 1;
                old_index += 1;
            }
            Edit::Update => {
                let splice = pending.get_or_insert_with(|| Splice::new(index, Vec::new(), 0));
                splice.added_count += 1;
                splice.removed.push(old[old_index].clone());
                index += 1;
                old_index += 1;
            }
            Edit::Add => {
                let splice = pending.get_or_insert_with(|| Splice::new(index, Vec::new(), 0));
                splice.added_count += 1;
                index += 1;
            }
            Edit::Delete => {
                let splice = pending.get_or_insert_with(|| Splice::new(index, Vec::new(), 0));
                splice.removed.push(old[old_index].clone());
                old_index += 1;
            }
        }
    }
    if let Some(splice) = pending {
        splices.push(splice);
    }
    splices
}

/// Replay `splices` onto `previous`, pulling added elements from `current`.
///
/// After this call `previous` mirrors `current` over every spliced range.
pub fn apply_splices(previous: &mut Vec<Value>, current: &[Value], splices: &[Splice]) {
    for splice in splices {
        let start = splice.index.min(previous.len());
        let end = (start + splice.removed.len()).min(previous.len());
        let added_end = (splice.index + splice.added_count).min(current.len());
        let added = current[splice.index.min(added_end)..added_end].iter().cloned();
        previous.splice(start..end, added);
    }
}

fn shared_prefix(current: &[Value], old: &[Value], search_len: usize) -> usize {
    current
        .iter()
        .zip(old)
        .take(search_len)
        .take_while(|(a, b)| a.same(b))
        .count()
}

fn shared_suffix(current: &[Value], old: &[Value], search_len: usize) -> usize {
    current
        .iter()
        .rev()
        .zip(old.iter().rev())
        .take(search_len)
        .take_while(|(a, b)| a.same(b))
        .count()
}

/// Edit-distance table, `rows = old.len() + 1`, `cols = current.len() + 1`.
struct Distances {
    cols: usize,
    cells: Vec<usize>,
}

impl Distances {
    fn compute(current: &[Value], old: &[Value]) -> Self {
        let rows = old.len() + 1;
        let cols = current.len() + 1;
        let mut cells = vec![0usize; rows * cols];
        for i in 0..rows {
            cells[i * cols] = i;
        }
        for (j, cell) in cells.iter_mut().enumerate().take(cols) {
            *cell = j;
        }
        for i in 1..rows {
            for j in 1..cols {
                cells[i * cols + j] = if current[j - 1].same(&old[i - 1]) {
                    cells[(i - 1) * cols + (j - 1)]
                } else {
                    let north = cells[(i - 1) * cols + j] + 1;
                    let west = cells[i * cols + (j - 1)] + 1;
                    north.min(west)
                };
            }
        }
        Self { cols, cells }
    }

    fn at(&self, i: usize, j: usize) -> usize {
        self.cells[i * self.cols + j]
    }
}

fn edit_operations(current: &[Value], old: &[Value]) -> Vec<Edit> {
    let distances = Distances::compute(current, old);
    let mut i = old.len();
    let mut j = current.len();
    let mut at = distances.at(i, j);
    let mut edits = Vec::with_capacity(i + j);

    while i > 0 || j > 0 {
        if i == 0 {
            edits.push(Edit::Add);
            j -= 1;
            continue;
        }
        if j == 0 {
            edits.push(Edit::Delete);
            i -= 1;
            continue;
        }

        let north_west = distances.at(i - 1, j - 1);
        let delete = distances.at(i - 1, j);
        let add = distances.at(i, j - 1);

        let min = if delete < add {
            delete.min(north_west)
        } else {
            add.min(north_west)
        };

        if min == north_west {
            if north_west == at {
                edits.push(Edit::Leave);
            } else {
                edits.push(Edit::Update);
                at = north_west;
            }
            i -= 1;
            j -= 1;
        } else if min == delete {
            edits.push(Edit::Delete);
            i -= 1;
            at = delete;
        } else {
            edits.push(Edit::Add);
            j -= 1;
            at = add;
        }
    }

    edits.reverse();
    edits
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
