//! Format detection from a bounded header window and the filename.
use crate::errors::{LucidError, LucidResult};
use crate::format::Format;
use itertools::Itertools;

/// One position of an anchored signature.
#[derive(Clone, Copy, Debug)]
pub enum Token {
    Byte(u8),
    OneOf(&'static [u8]),
    /// A protobuf base-128 varint of any value.
    Varint,
}

#[derive(Clone, Copy, Debug)]
pub enum Signature {
    /// Tokens matched in sequence starting at `offset`.
    At { offset: usize, tokens: &'static [Token] },
    /// A byte string occurring anywhere in the window.
    Within(&'static [u8]),
}

impl Signature {
    /// Number of constrained bytes matched, or None when the window does not match.
    pub fn specificity(&self, window: &[u8]) -> Option<usize> {
        match self {
            Signature::At { offset, tokens } => {
                let mut pos = *offset;
                let mut score = 0;
                for token in tokens.iter() {
                    match token {
                        Token::Byte(b) => {
                            if window.get(pos) != Some(b) {
                                return None;
                            }
                            pos += 1;
                            score += 1;
                        }
                        Token::OneOf(set) => {
                            if !set.contains(window.get(pos)?) {
                                return None;
                            }
                            pos += 1;
                            score += 1;
                        }
                        Token::Varint => pos += varint_len(window.get(pos..)?)?,
                    }
                }
                Some(score)
            }
            Signature::Within(needle) => {
                if window.windows(needle.len()).any(|w| w == *needle) {
                    Some(needle.len())
                } else {
                    None
                }
            }
        }
    }
}

fn varint_len(bytes: &[u8]) -> Option<usize> {
    bytes.iter().take(10).position(|b| b & 0x80 == 0).map(|p| p + 1)
}

/// What a decoder recognizes: header signatures, file extensions and exact file names.
#[derive(Clone, Copy, Debug)]
pub struct Claim {
    pub format: Format,
    pub signatures: &'static [Signature],
    /// Lowercase, without the dot.
    pub extensions: &'static [&'static str],
    pub filenames: &'static [&'static str],
}

impl Claim {
    pub fn specificity(&self, window: &[u8]) -> Option<usize> {
        self.signatures.iter().filter_map(|s| s.specificity(window)).max()
    }

    pub fn matches_filename(&self, filename: &str) -> bool {
        let basename = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
        if self.filenames.iter().any(|f| f.eq_ignore_ascii_case(basename)) {
            return true;
        }
        match basename.rsplit_once('.') {
            Some((_, ext)) => self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)),
            None => false,
        }
    }
}

/// Picks the format of `bytes` among `claims`, reading at most `window` bytes.
///
/// The most specific signature wins. The filename breaks ties, and is the only clue when no
/// signature matches.
pub fn sniff<'c>(
    claims: impl IntoIterator<Item = &'c Claim>,
    bytes: &[u8],
    filename: Option<&str>,
    window: usize,
) -> LucidResult<Format> {
    let header = &bytes[..bytes.len().min(window)];
    let claims = claims.into_iter().collect_vec();
    let by_name = |c: &&Claim| filename.is_some_and(|f| c.matches_filename(f));

    let scored =
        claims.iter().filter_map(|c| Some((*c, c.specificity(header)?))).collect_vec();
    if let Some(best) = scored.iter().map(|(_, s)| *s).max() {
        let top = scored.iter().filter(|(_, s)| *s == best).map(|(c, _)| *c).collect_vec();
        if top.len() == 1 {
            debug!("Sniffed {} from signature (specificity {})", top[0].format, best);
            return Ok(top[0].format);
        }
        let named = top.iter().copied().filter(by_name).collect_vec();
        if named.len() == 1 {
            debug!("Sniffed {} from signature and filename", named[0].format);
            return Ok(named[0].format);
        }
        return Err(LucidError::AmbiguousFormat {
            candidates: top.iter().map(|c| c.format).collect(),
        });
    }

    let named = claims.iter().copied().filter(by_name).collect_vec();
    if named.len() == 1 {
        debug!("Sniffed {} from filename only", named[0].format);
        return Ok(named[0].format);
    }
    Err(LucidError::UnrecognizedFormat { filename: filename.map(|f| f.to_string()) })
}
