//! Line-oriented text comparison producing unified diffs.
//!
//! Longest-matching-block algorithm over lines, rendered as unified
//! hunks with three lines of context. Comparison outcomes are modeled
//! explicitly so unavailable pages are never conflated with unchanged
//! ones.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const CONTEXT_LINES: usize = 3;

/// Which side of a comparison could not be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingSide {
    Current,
    Previous,
    Both,
}

/// Outcome of comparing a page's current text against its baseline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiffOutcome {
    /// Content changed; `diff` holds the unified diff.
    Changed { diff: String },
    /// Both sides present and identical.
    NoChanges,
    /// No baseline existed yet; a baseline was just established.
    FirstTime,
    /// One or both sides could not be obtained.
    Unavailable { side: MissingSide },
}

/// Per-URL comparison report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffReport {
    pub url: String,
    pub outcome: DiffOutcome,
}

/// Compare two optional page texts into an outcome.
///
/// `baseline_expected` controls the missing-previous case: rolling
/// comparisons treat it as first-time tracking, archive comparisons as
/// an unavailable side.
pub fn diff_report(url: &str, current: Option<&str>, previous: Option<&str>, baseline_expected: bool) -> DiffReport {
    let outcome = match (current, previous) {
        (None, None) => DiffOutcome::Unavailable { side: MissingSide::Both },
        (None, Some(_)) => DiffOutcome::Unavailable { side: MissingSide::Current },
        (Some(_), None) => {
            if baseline_expected {
                DiffOutcome::Unavailable { side: MissingSide::Previous }
            } else {
                DiffOutcome::FirstTime
            }
        }
        (Some(cur), Some(prev)) => {
            let diff = unified_diff(prev, cur, "previous", "current");
            if diff.is_empty() {
                DiffOutcome::NoChanges
            } else {
                DiffOutcome::Changed { diff }
            }
        }
    };

    DiffReport { url: url.to_string(), outcome }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpTag {
    Equal,
    Replace,
    Delete,
    Insert,
}

#[derive(Debug, Clone, Copy)]
struct Opcode {
    tag: OpTag,
    a1: usize,
    a2: usize,
    b1: usize,
    b2: usize,
}

/// Render a unified diff between two texts.
///
/// Returns an empty string when the texts are line-identical.
pub fn unified_diff(from_text: &str, to_text: &str, from_label: &str, to_label: &str) -> String {
    let a: Vec<&str> = from_text.lines().collect();
    let b: Vec<&str> = to_text.lines().collect();

    let groups = grouped_opcodes(&opcodes(&a, &b), CONTEXT_LINES);
    if groups.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    out.push_str(&format!("--- {from_label}\n"));
    out.push_str(&format!("+++ {to_label}\n"));

    for group in groups {
        let first = group[0];
        let last = group[group.len() - 1];
        out.push_str(&format!(
            "@@ -{} +{} @@\n",
            format_range(first.a1, last.a2),
            format_range(first.b1, last.b2)
        ));

        for op in group {
            match op.tag {
                OpTag::Equal => {
                    for line in &a[op.a1..op.a2] {
                        out.push_str(&format!(" {line}\n"));
                    }
                }
                OpTag::Replace | OpTag::Delete => {
                    for line in &a[op.a1..op.a2] {
                        out.push_str(&format!("-{line}\n"));
                    }
                }
                OpTag::Insert => {}
            }
            if matches!(op.tag, OpTag::Replace | OpTag::Insert) {
                for line in &b[op.b1..op.b2] {
                    out.push_str(&format!("+{line}\n"));
                }
            }
        }
    }

    out
}

fn format_range(start: usize, stop: usize) -> String {
    let length = stop - start;
    if length == 1 {
        format!("{}", start + 1)
    } else if length == 0 {
        format!("{start},0")
    } else {
        format!("{},{}", start + 1, length)
    }
}

/// Longest matching block within a[alo..ahi] and b[blo..bhi].
fn longest_match(
    a: &[&str], b2j: &HashMap<&str, Vec<usize>>, alo: usize, ahi: usize, blo: usize, bhi: usize,
) -> (usize, usize, usize) {
    let (mut besti, mut bestj, mut bestsize) = (alo, blo, 0);
    let mut j2len: HashMap<usize, usize> = HashMap::new();

    for (i, line) in a.iter().enumerate().take(ahi).skip(alo) {
        let mut new_j2len = HashMap::new();
        if let Some(indices) = b2j.get(line) {
            for &j in indices {
                if j < blo {
                    continue;
                }
                if j >= bhi {
                    break;
                }
                let k = if j == 0 { 1 } else { j2len.get(&(j - 1)).copied().unwrap_or(0) + 1 };
                new_j2len.insert(j, k);
                if k > bestsize {
                    besti = i + 1 - k;
                    bestj = j + 1 - k;
                    bestsize = k;
                }
            }
        }
        j2len = new_j2len;
    }

    (besti, bestj, bestsize)
}

fn matching_blocks(a: &[&str], b: &[&str]) -> Vec<(usize, usize, usize)> {
    let mut b2j: HashMap<&str, Vec<usize>> = HashMap::new();
    for (j, &line) in b.iter().enumerate() {
        b2j.entry(line).or_default().push(j);
    }

    let mut queue = vec![(0, a.len(), 0, b.len())];
    let mut blocks = Vec::new();

    while let Some((alo, ahi, blo, bhi)) = queue.pop() {
        let (i, j, k) = longest_match(a, &b2j, alo, ahi, blo, bhi);
        if k > 0 {
            blocks.push((i, j, k));
            queue.push((alo, i, blo, j));
            queue.push((i + k, ahi, j + k, bhi));
        }
    }

    blocks.sort_unstable();
    blocks.push((a.len(), b.len(), 0));
    blocks
}

fn opcodes(a: &[&str], b: &[&str]) -> Vec<Opcode> {
    let mut ops = Vec::new();
    let (mut i, mut j) = (0, 0);

    for (ai, bj, size) in matching_blocks(a, b) {
        let tag = match (i < ai, j < bj) {
            (true, true) => Some(OpTag::Replace),
            (true, false) => Some(OpTag::Delete),
            (false, true) => Some(OpTag::Insert),
            (false, false) => None,
        };
        if let Some(tag) = tag {
            ops.push(Opcode { tag, a1: i, a2: ai, b1: j, b2: bj });
        }
        if size > 0 {
            ops.push(Opcode { tag: OpTag::Equal, a1: ai, a2: ai + size, b1: bj, b2: bj + size });
        }
        i = ai + size;
        j = bj + size;
    }

    ops
}

/// Group opcodes into hunks separated by at most 2n context lines.
fn grouped_opcodes(ops: &[Opcode], n: usize) -> Vec<Vec<Opcode>> {
    if ops.iter().all(|op| op.tag == OpTag::Equal) {
        return Vec::new();
    }

    let mut codes: Vec<Opcode> = ops.to_vec();

    if let Some(first) = codes.first_mut()
        && first.tag == OpTag::Equal
    {
        first.a1 = first.a1.max(first.a2.saturating_sub(n));
        first.b1 = first.b1.max(first.b2.saturating_sub(n));
    }
    if let Some(last) = codes.last_mut()
        && last.tag == OpTag::Equal
    {
        last.a2 = last.a2.min(last.a1 + n);
        last.b2 = last.b2.min(last.b1 + n);
    }

    let mut groups = Vec::new();
    let mut group: Vec<Opcode> = Vec::new();

    for op in codes {
        // A long equal run ends the current hunk and starts the next.
        if op.tag == OpTag::Equal && op.a2 - op.a1 > 2 * n {
            if !group.is_empty() {
                let mut head = op;
                head.a2 = head.a2.min(head.a1 + n);
                head.b2 = head.b2.min(head.b1 + n);
                group.push(head);
                groups.push(group);
                group = Vec::new();
            }
            let mut tail = op;
            tail.a1 = tail.a1.max(tail.a2.saturating_sub(n));
            tail.b1 = tail.b1.max(tail.b2.saturating_sub(n));
            group.push(tail);
            continue;
        }
        group.push(op);
    }

    if group.len() > 1 || (group.len() == 1 && group[0].tag != OpTag::Equal) {
        groups.push(group);
    }

    groups
}
