//! Rewrites files made of repeated blocks:
//!
//! ```text
//! <N>
//! <metadata: whitespace-separated tokens>
//! <atom line 1>
//! ...
//! <atom line N>
//! ```
//!
//! Each block's metadata line is replaced by a labeled header built from a [`HeaderLayout`],
//! which turns the file into extended XYZ. Atom lines are copied as-is.
//!
//! Bad blocks don't abort the file. A count line that isn't an integer, or a metadata line with
//! too few tokens, is logged and recorded in the [`ReformatSummary`]; scanning picks up at the
//! next block. If the input ends partway through a block, the blocks already written are kept
//! and the partial one is dropped.

use std::{
    fmt,
    io::{self, BufRead, Write},
};

use log::{debug, warn};

use crate::layout::HeaderLayout;

/// A block that was passed over. Line numbers are 1-based.
#[derive(Clone, Debug, PartialEq)]
pub enum SkippedBlock {
    /// A non-blank line where an atom count was expected.
    MalformedCount { line: usize, text: String },
    /// The metadata line was too short for the layout. The block's atom lines were consumed.
    MetadataShortage {
        line: usize,
        found: usize,
        required: usize,
    },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BlockStage {
    Metadata,
    AtomLines { expected: usize, found: usize },
    /// Discarding the atom lines of a skipped block.
    Skipping { expected: usize, found: usize },
}

/// Where the input ran out, if it ended inside a block.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Truncation {
    /// Line of the block's atom count.
    pub count_line: usize,
    pub stage: BlockStage,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReformatSummary {
    pub blocks_written: usize,
    pub lines_read: usize,
    pub skipped: Vec<SkippedBlock>,
    pub truncated: Option<Truncation>,
}

impl ReformatSummary {
    /// No skipped blocks and no truncation.
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.truncated.is_none()
    }
}

impl fmt::Display for ReformatSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} blocks written", self.blocks_written)?;
        if !self.skipped.is_empty() {
            write!(f, ", {} skipped", self.skipped.len())?;
        }
        if self.truncated.is_some() {
            write!(f, ", truncated")?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum State {
    /// Looking for an atom count line.
    Scanning,
    /// Have a count; the metadata line and `n` atom lines follow.
    InBlock { n: usize, count_line: usize },
}

/// Line reader that tracks line numbers and strips terminators. Invalid UTF-8 is replaced
/// rather than failing the file.
struct Lines<R> {
    inner: R,
    bytes: Vec<u8>,
    text: String,
    line_num: usize,
}

impl<R: BufRead> Lines<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            bytes: Vec::new(),
            text: String::new(),
            line_num: 0,
        }
    }

    fn next_line(&mut self) -> io::Result<Option<(usize, &str)>> {
        self.bytes.clear();
        if self.inner.read_until(b'\n', &mut self.bytes)? == 0 {
            return Ok(None);
        }
        self.line_num += 1;

        let mut line = &self.bytes[..];
        if let Some(l) = line.strip_suffix(b"\n") {
            line = l;
            if let Some(l) = line.strip_suffix(b"\r") {
                line = l;
            }
        }
        self.text = String::from_utf8_lossy(line).into_owned();

        Ok(Some((self.line_num, &self.text)))
    }
}

/// Reformat every block of `input` into `output`. `source` names the input in log messages.
///
/// Only I/O errors are returned; malformed and truncated blocks are reported in the summary.
pub fn reformat<R: BufRead, W: Write>(
    input: R,
    mut output: W,
    layout: &HeaderLayout,
    source: &str,
) -> io::Result<ReformatSummary> {
    let mut lines = Lines::new(input);
    let mut summary = ReformatSummary::default();
    let required = layout.max_index() + 1;

    // Holds one complete block, so nothing partial reaches the output.
    let mut block = String::new();
    let mut state = State::Scanning;

    loop {
        match state {
            State::Scanning => {
                let Some((line_num, line)) = lines.next_line()? else {
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match line.parse::<usize>() {
                    Ok(n) => {
                        state = State::InBlock {
                            n,
                            count_line: line_num,
                        }
                    }
                    Err(_) => {
                        warn!(
                            "Expected an integer atom count but got '{line}' ({source}, line {line_num}). Continuing."
                        );
                        summary.skipped.push(SkippedBlock::MalformedCount {
                            line: line_num,
                            text: line.to_owned(),
                        });
                    }
                }
            }

            State::InBlock { n, count_line } => {
                state = State::Scanning;

                let Some((meta_line_num, meta)) = lines.next_line()? else {
                    warn!("Unexpected end of file reading metadata after atom count ({source}, line {count_line})");
                    summary.truncated = Some(Truncation {
                        count_line,
                        stage: BlockStage::Metadata,
                    });
                    break;
                };

                let tokens: Vec<&str> = meta.split_whitespace().collect();
                let found = tokens.len();

                let Some(header) = layout.render(&tokens) else {
                    warn!(
                        "Metadata has {found} tokens but at least {required} are needed; skipping block ({source}, line {meta_line_num})"
                    );
                    summary.skipped.push(SkippedBlock::MetadataShortage {
                        line: meta_line_num,
                        found,
                        required,
                    });

                    // Keep the stream aligned on the next block.
                    for i in 0..n {
                        if lines.next_line()?.is_none() {
                            summary.truncated = Some(Truncation {
                                count_line,
                                stage: BlockStage::Skipping {
                                    expected: n,
                                    found: i,
                                },
                            });
                            break;
                        }
                    }
                    if summary.truncated.is_some() {
                        warn!("Unexpected end of file skipping {n} atom lines ({source}, block at line {count_line})");
                        break;
                    }
                    continue;
                };

                block.clear();
                block.push_str(&n.to_string());
                block.push('\n');
                block.push_str(&header);
                block.push('\n');

                let mut found = 0;
                while found < n {
                    let Some((_, atom_line)) = lines.next_line()? else {
                        break;
                    };
                    block.push_str(atom_line);
                    block.push('\n');
                    found += 1;
                }

                if found < n {
                    warn!(
                        "Unexpected end of file reading {n} atom lines; found {found} ({source}, block {} at line {count_line})",
                        summary.blocks_written
                    );
                    summary.truncated = Some(Truncation {
                        count_line,
                        stage: BlockStage::AtomLines { expected: n, found },
                    });
                    break;
                }

                output.write_all(block.as_bytes())?;
                summary.blocks_written += 1;
            }
        }
    }

    output.flush()?;
    summary.lines_read = lines.line_num;
    debug!("{source}: {summary}");

    Ok(summary)
}

/// Convenience wrapper for in-memory text.
pub fn reformat_str(text: &str, layout: &HeaderLayout) -> io::Result<(String, ReformatSummary)> {
    let mut out = Vec::new();
    let summary = reformat(text.as_bytes(), &mut out, layout, "<string>")?;

    let out = String::from_utf8(out)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "Invalid UTF8"))?;

    Ok((out, summary))
}
