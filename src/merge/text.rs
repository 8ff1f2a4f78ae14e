//! merge::text
//!
//! Line-level three-way textual merge.
//!
//! # Algorithm
//!
//! Classic diff3: both derived versions are matched against the base
//! with a line-level LCS. Runs where base, ours and theirs align
//! anchor the chunking; between anchors, each side's slice is compared
//! against the base slice. A chunk changed on one side takes that
//! side; identical changes collapse; divergent changes produce a
//! conflict block:
//!
//! ```text
//! <<<<<<< HEAD
//! <ours>
//! ||||||| BASE
//! <base>
//! =======
//! <theirs>
//! >>>>>>> MERGE_HEAD
//! ```
//!
//! The `BASE` section is always included. Non-conflicting context is
//! preserved verbatim, including line endings.

/// Conflict block marker lines.
const MARK_OURS: &[u8] = b"<<<<<<< HEAD\n";
const MARK_BASE: &[u8] = b"||||||| BASE\n";
const MARK_SEP: &[u8] = b"=======\n";
const MARK_THEIRS: &[u8] = b">>>>>>> MERGE_HEAD\n";

/// The result of a textual merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMerge {
    /// Whether any conflict block was emitted.
    pub conflicted: bool,
    /// The merged bytes (with markers when conflicted).
    pub bytes: Vec<u8>,
}

impl TextMerge {
    /// Whether the merge reconciled cleanly.
    pub fn is_clean(&self) -> bool {
        !self.conflicted
    }
}

/// Merge two derived byte sequences against their common base.
pub fn merge3(base: &[u8], ours: &[u8], theirs: &[u8]) -> TextMerge {
    let base_lines = split_lines(base);
    let our_lines = split_lines(ours);
    let their_lines = split_lines(theirs);

    // base-index -> derived-index for lines the LCS matched.
    let match_ours = lcs_match(&base_lines, &our_lines);
    let match_theirs = lcs_match(&base_lines, &their_lines);

    let mut out = Vec::new();
    let mut conflicted = false;

    let (mut i, mut j, mut k) = (0usize, 0usize, 0usize);
    loop {
        let stable = i < base_lines.len()
            && match_ours[i] == Some(j)
            && match_theirs[i] == Some(k);

        if stable {
            out.extend_from_slice(base_lines[i]);
            i += 1;
            j += 1;
            k += 1;
            continue;
        }

        if i >= base_lines.len() && j >= our_lines.len() && k >= their_lines.len() {
            break;
        }

        // Advance to the next base line matched on both sides; the
        // unstable chunk spans everything before it.
        let mut i2 = i;
        while i2 < base_lines.len()
            && !(match_ours[i2].is_some() && match_theirs[i2].is_some())
        {
            i2 += 1;
        }
        let (j2, k2) = if i2 < base_lines.len() {
            (
                match_ours[i2].expect("checked above"),
                match_theirs[i2].expect("checked above"),
            )
        } else {
            (our_lines.len(), their_lines.len())
        };

        let base_chunk = &base_lines[i..i2];
        let our_chunk = &our_lines[j..j2];
        let their_chunk = &their_lines[k..k2];

        if our_chunk == their_chunk {
            push_lines(&mut out, our_chunk);
        } else if our_chunk == base_chunk {
            push_lines(&mut out, their_chunk);
        } else if their_chunk == base_chunk {
            push_lines(&mut out, our_chunk);
        } else {
            conflicted = true;
            out.extend_from_slice(MARK_OURS);
            push_section(&mut out, our_chunk);
            out.extend_from_slice(MARK_BASE);
            push_section(&mut out, base_chunk);
            out.extend_from_slice(MARK_SEP);
            push_section(&mut out, their_chunk);
            out.extend_from_slice(MARK_THEIRS);
        }

        i = i2;
        j = j2;
        k = k2;
    }

    TextMerge {
        conflicted,
        bytes: out,
    }
}

/// Split into lines, each retaining its trailing newline.
fn split_lines(bytes: &[u8]) -> Vec<&[u8]> {
    if bytes.is_empty() {
        return Vec::new();
    }
    bytes.split_inclusive(|&b| b == b'\n').collect()
}

fn push_lines(out: &mut Vec<u8>, lines: &[&[u8]]) {
    for line in lines {
        out.extend_from_slice(line);
    }
}

/// Append a conflict section, newline-terminating it so the following
/// marker starts on its own line.
fn push_section(out: &mut Vec<u8>, lines: &[&[u8]]) {
    push_lines(out, lines);
    if lines.last().is_some_and(|l| !l.ends_with(b"\n")) {
        out.push(b'\n');
    }
}

/// LCS line matching: for each index of `a`, the index of `b` it is
/// paired with, or `None` where unmatched.
fn lcs_match(a: &[&[u8]], b: &[&[u8]]) -> Vec<Option<usize>> {
    let n = a.len();
    let m = b.len();
    // lengths[i][j] = LCS length of a[i..] and b[j..]
    let mut lengths = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lengths[i][j] = if a[i] == b[j] {
                lengths[i + 1][j + 1] + 1
            } else {
                lengths[i + 1][j].max(lengths[i][j + 1])
            };
        }
    }

    let mut matches = vec![None; n];
    let (mut i, mut j) = (0usize, 0usize);
    while i < n && j < m {
        if a[i] == b[j] {
            matches[i] = Some(j);
            i += 1;
            j += 1;
        } else if lengths[i + 1][j] >= lengths[i][j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    matches
}
