// SPDX-FileCopyrightText: 2025 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2025 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The `DiffProvider` contract (§4.5): minimal edit scripts, the
//! diff-match-patch textual delta format, and best-effort fuzzy patching.
//! The Myers diff itself is [`dissimilar`]; everything downstream of it
//! (delta serialization, patch construction and application) is specific
//! to this wire format, so it is implemented here from the well-known
//! diff-match-patch algorithm.

use crate::uri::{decode_uri, encode_uri};
use anyhow::{bail, Result};

/// One chunk of a minimal edit script turning a source string into a
/// target string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffOp {
    Equal(String),
    Delete(String),
    Insert(String),
}

/// The typed edit representation yielded by [`EditDeltaParser::parse_edits`]
/// and consumed on the wire as `Delta.edits` (§6). Unlike [`DiffOp`] it
/// carries no text for `Equal`/`Delete`, only a length, since applying an
/// edit stream only ever needs to know how much of the base text to skip
/// or drop.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum EditOp {
    Retain { count: usize },
    Delete { count: usize },
    Insert { text: String },
}

/// A single hunk of a patch: a span of `diffs` (with leading/trailing
/// equal-context) anchored at a position in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub start1: usize,
    pub length1: usize,
    pub start2: usize,
    pub length2: usize,
    pub diffs: Vec<DiffOp>,
}

/// How much unchanged context diff-match-patch keeps around each hunk so a
/// fuzzy match still has something to anchor on.
const PATCH_MARGIN: usize = 4;

pub trait DiffProvider: Send + Sync {
    fn diff_main(&self, a: &str, b: &str) -> Vec<DiffOp>;
    fn diff_cleanup_efficiency(&self, diffs: &mut Vec<DiffOp>);
    fn diff_to_delta(&self, diffs: &[DiffOp]) -> String;
    fn diff_from_delta(&self, base: &str, delta_text: &str) -> Result<Vec<DiffOp>>;
    fn diff_text2(&self, diffs: &[DiffOp]) -> String;
    fn patch_make(&self, text: &str, diffs: &[DiffOp]) -> Vec<Patch>;
    fn patch_apply(&self, patches: &[Patch], text: &str) -> (String, Vec<bool>);
}

/// The only implementation we ship: Myers diff via `dissimilar`, classic
/// diff-match-patch delta/patch encoding on top.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextDiffProvider;

impl DiffProvider for TextDiffProvider {
    fn diff_main(&self, a: &str, b: &str) -> Vec<DiffOp> {
        dissimilar::diff(a, b)
            .into_iter()
            .map(|chunk| match chunk {
                dissimilar::Chunk::Equal(s) => DiffOp::Equal(s.to_string()),
                dissimilar::Chunk::Delete(s) => DiffOp::Delete(s.to_string()),
                dissimilar::Chunk::Insert(s) => DiffOp::Insert(s.to_string()),
            })
            .collect()
    }

    fn diff_cleanup_efficiency(&self, diffs: &mut Vec<DiffOp>) {
        cleanup_efficiency(diffs);
    }

    fn diff_to_delta(&self, diffs: &[DiffOp]) -> String {
        diffs
            .iter()
            .map(|d| match d {
                DiffOp::Equal(s) => format!("={}", s.chars().count()),
                DiffOp::Delete(s) => format!("-{}", s.chars().count()),
                DiffOp::Insert(s) => format!("+{}", encode_uri(s)),
            })
            .collect::<Vec<_>>()
            .join("\t")
    }

    fn diff_from_delta(&self, base: &str, delta_text: &str) -> Result<Vec<DiffOp>> {
        let base_chars: Vec<char> = base.chars().collect();
        let mut pos = 0usize;
        let mut diffs = Vec::new();

        if delta_text.is_empty() {
            return Ok(diffs);
        }

        for token in delta_text.split('\t') {
            if token.is_empty() {
                continue;
            }
            let (tag, rest) = token.split_at(1);
            match tag {
                "+" => {
                    let text = decode_uri(rest)?;
                    diffs.push(DiffOp::Insert(text));
                }
                "=" | "-" => {
                    let count: usize = rest
                        .parse()
                        .map_err(|_| anyhow::anyhow!("non-numeric count in token '{token}'"))?;
                    if pos + count > base_chars.len() {
                        bail!(
                            "delta token '{token}' runs past the end of the base text ({} chars available)",
                            base_chars.len() - pos
                        );
                    }
                    let span: String = base_chars[pos..pos + count].iter().collect();
                    pos += count;
                    diffs.push(if tag == "=" {
                        DiffOp::Equal(span)
                    } else {
                        DiffOp::Delete(span)
                    });
                }
                _ => bail!("unrecognized delta token '{token}'"),
            }
        }

        if pos != base_chars.len() {
            bail!(
                "delta covers {pos} of {} base characters, expected all of them",
                base_chars.len()
            );
        }

        Ok(diffs)
    }

    fn diff_text2(&self, diffs: &[DiffOp]) -> String {
        diff_text2(diffs)
    }

    fn patch_make(&self, text: &str, diffs: &[DiffOp]) -> Vec<Patch> {
        patch_make(text, diffs)
    }

    fn patch_apply(&self, patches: &[Patch], text: &str) -> (String, Vec<bool>) {
        patch_apply(patches, text)
    }
}

fn diff_text1(diffs: &[DiffOp]) -> String {
    diffs
        .iter()
        .filter_map(|d| match d {
            DiffOp::Equal(s) | DiffOp::Delete(s) => Some(s.as_str()),
            DiffOp::Insert(_) => None,
        })
        .collect()
}

fn diff_text2(diffs: &[DiffOp]) -> String {
    diffs
        .iter()
        .filter_map(|d| match d {
            DiffOp::Equal(s) | DiffOp::Insert(s) => Some(s.as_str()),
            DiffOp::Delete(_) => None,
        })
        .collect()
}

/// Merges adjacent diffs that are individually "not worth" a separate edit,
/// i.e. short equal spans sandwiched between edits. A simplified variant of
/// diff-match-patch's `diff_cleanupEfficiency`: short equalities between two
/// edits are folded into the surrounding delete/insert since re-sending
/// them costs more than just deleting-and-reinserting the few chars.
fn cleanup_efficiency(diffs: &mut Vec<DiffOp>) {
    const EDIT_COST: usize = 4;
    let mut i = 0;
    while i + 2 < diffs.len() {
        let merged = match (&diffs[i], &diffs[i + 1], &diffs[i + 2]) {
            (DiffOp::Delete(d) | DiffOp::Insert(d), DiffOp::Equal(eq), edit_after)
                if !matches!(edit_after, DiffOp::Equal(_))
                    && !eq.is_empty()
                    && eq.chars().count() < EDIT_COST =>
            {
                let merged_text = format!("{d}{eq}");
                Some(match &diffs[i] {
                    DiffOp::Delete(_) => DiffOp::Delete(merged_text),
                    DiffOp::Insert(_) => DiffOp::Insert(merged_text),
                    DiffOp::Equal(_) => unreachable!(),
                })
            }
            _ => None,
        };

        if let Some(merged) = merged {
            diffs[i] = merged;
            diffs.remove(i + 1);
        } else {
            i += 1;
        }
    }
    diffs.retain(|d| !text_of(d).is_empty());
}

fn text_of(d: &DiffOp) -> &str {
    match d {
        DiffOp::Equal(s) | DiffOp::Delete(s) | DiffOp::Insert(s) => s,
    }
}

fn patch_make(text1: &str, diffs: &[DiffOp]) -> Vec<Patch> {
    if diffs.is_empty() {
        return Vec::new();
    }

    let mut patches = Vec::new();
    let mut current = Patch {
        start1: 0,
        length1: 0,
        start2: 0,
        length2: 0,
        diffs: Vec::new(),
    };

    let mut prepatch_text: Vec<char> = text1.chars().collect();
    let mut postpatch_text = prepatch_text.clone();
    let mut char_count1 = 0usize;
    let mut char_count2 = 0usize;

    for (i, d) in diffs.iter().enumerate() {
        let op_len = text_of(d).chars().count();

        if current.diffs.is_empty() && !matches!(d, DiffOp::Equal(_)) {
            current.start1 = char_count1;
            current.start2 = char_count2;
        }

        match d {
            DiffOp::Insert(s) => {
                current.diffs.push(d.clone());
                current.length2 += op_len;
                let chars: Vec<char> = s.chars().collect();
                postpatch_text.splice(char_count2..char_count2, chars);
            }
            DiffOp::Delete(_) => {
                current.diffs.push(d.clone());
                current.length1 += op_len;
                let end = (char_count2 + op_len).min(postpatch_text.len());
                postpatch_text.drain(char_count2..end);
            }
            DiffOp::Equal(_) => {
                let is_last = i == diffs.len() - 1;
                if op_len <= 2 * PATCH_MARGIN && !current.diffs.is_empty() && !is_last {
                    current.diffs.push(d.clone());
                    current.length1 += op_len;
                    current.length2 += op_len;
                }
                if op_len >= 2 * PATCH_MARGIN && !current.diffs.is_empty() {
                    add_context(&mut current, &prepatch_text);
                    patches.push(current);
                    current = Patch {
                        start1: 0,
                        length1: 0,
                        start2: 0,
                        length2: 0,
                        diffs: Vec::new(),
                    };
                    prepatch_text = postpatch_text.clone();
                    char_count1 = char_count2;
                }
            }
        }

        if !matches!(d, DiffOp::Insert(_)) {
            char_count1 += op_len;
        }
        if !matches!(d, DiffOp::Delete(_)) {
            char_count2 += op_len;
        }
    }

    if !current.diffs.is_empty() {
        add_context(&mut current, &prepatch_text);
        patches.push(current);
    }

    patches
}

fn add_context(patch: &mut Patch, text: &[char]) {
    if text.is_empty() {
        return;
    }

    let lead_start = patch.start1.saturating_sub(PATCH_MARGIN);
    let lead: Vec<char> = text[lead_start..patch.start1].to_vec();
    if !lead.is_empty() {
        patch.diffs.insert(0, DiffOp::Equal(lead.iter().collect()));
        patch.start1 -= lead.len();
        patch.start2 -= lead.len();
        patch.length1 += lead.len();
        patch.length2 += lead.len();
    }

    let trail_end = (patch.start1 + patch.length1 + PATCH_MARGIN).min(text.len());
    let trail_start = (patch.start1 + patch.length1).min(text.len());
    let trail: Vec<char> = text[trail_start..trail_end].to_vec();
    if !trail.is_empty() {
        patch.diffs.push(DiffOp::Equal(trail.iter().collect()));
        patch.length1 += trail.len();
        patch.length2 += trail.len();
    }
}

fn patch_apply(patches: &[Patch], text: &str) -> (String, Vec<bool>) {
    if patches.is_empty() {
        return (text.to_string(), Vec::new());
    }

    let mut chars: Vec<char> = text.chars().collect();
    let mut results = Vec::with_capacity(patches.len());
    let mut delta: isize = 0;

    for patch in patches {
        let needle: Vec<char> = diff_text1(&patch.diffs).chars().collect();
        let replacement: Vec<char> = diff_text2(&patch.diffs).chars().collect();
        let expected = (patch.start1 as isize + delta).clamp(0, chars.len() as isize) as usize;

        match find_anchor(&chars, &needle, expected) {
            Some(loc) => {
                let end = (loc + needle.len()).min(chars.len());
                chars.splice(loc..end, replacement.iter().copied());
                delta += replacement.len() as isize - needle.len() as isize;
                results.push(true);
            }
            None => results.push(false),
        }
    }

    (chars.into_iter().collect(), results)
}

/// Finds `needle` in `haystack`, preferring the occurrence closest to
/// `expected`. Not the Bitap fuzzy matcher diff-match-patch uses upstream,
/// but satisfies the same "best-effort merge, rejected hunks discarded"
/// contract for exact-context hunks, which is what `patch_make` produces.
fn find_anchor(haystack: &[char], needle: &[char], expected: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(expected.min(haystack.len()));
    }
    if needle.len() > haystack.len() {
        return None;
    }

    let matches_at = |pos: usize| haystack[pos..pos + needle.len()] == *needle;

    if expected <= haystack.len() - needle.len() && matches_at(expected) {
        return Some(expected);
    }

    (0..=haystack.len() - needle.len())
        .filter(|&pos| matches_at(pos))
        .min_by_key(|&pos| pos.abs_diff(expected))
}

/// Parses delta text (§4.5) into the typed edit ops carried on the wire,
/// independent of any base text.
pub struct EditDeltaParser;

impl EditDeltaParser {
    pub fn parse_edits(delta_text: &str) -> Result<Vec<EditOp>> {
        let mut edits = Vec::new();
        if delta_text.is_empty() {
            return Ok(edits);
        }
        for token in delta_text.split('\t') {
            if token.is_empty() {
                continue;
            }
            let (tag, rest) = token.split_at(1);
            let op = match tag {
                "=" => EditOp::Retain {
                    count: rest
                        .parse()
                        .map_err(|_| anyhow::anyhow!("bad retain count in '{token}'"))?,
                },
                "-" => EditOp::Delete {
                    count: rest
                        .parse()
                        .map_err(|_| anyhow::anyhow!("bad delete count in '{token}'"))?,
                },
                "+" => EditOp::Insert {
                    text: decode_uri(rest)?,
                },
                _ => bail!("unrecognized edit token '{token}'"),
            };
            edits.push(op);
        }
        Ok(edits)
    }

    /// The inverse of [`Self::parse_edits`]: reassembles delta text from a
    /// wire-received `edits` list, so it can be fed to `diff_fromDelta`
    /// alongside the view's shadow.
    pub fn edits_to_delta_text(edits: &[EditOp]) -> String {
        edits
            .iter()
            .map(|op| match op {
                EditOp::Retain { count } => format!("={count}"),
                EditOp::Delete { count } => format!("-{count}"),
                EditOp::Insert { text } => format!("+{}", encode_uri(text)),
            })
            .collect::<Vec<_>>()
            .join("\t")
    }
}
