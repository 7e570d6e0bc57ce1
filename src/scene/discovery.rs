//! Candidate directory discovery and the model file listing shared by the candidates.

use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("failed to read directory {path}: {source}")]
    ReadDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Sub-directories (or links to them) of `work_dir`, sorted by name.
pub fn discover_candidates(work_dir: &Path) -> Result<Vec<String>, DiscoveryError> {
    let entries = std::fs::read_dir(work_dir).map_err(|source| DiscoveryError::ReadDir {
        path: work_dir.display().to_string(),
        source,
    })?;

    let mut candidates = Vec::new();
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        // Links count only when they resolve to a directory.
        let is_dir = file_type.is_dir()
            || (file_type.is_symlink()
                && std::fs::metadata(entry.path()).is_ok_and(|meta| meta.is_dir()));
        if !is_dir {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            candidates.push(name.to_string());
        }
    }
    candidates.sort();
    log::debug!("Discovered candidates: {}", candidates.join(", "));
    Ok(candidates)
}

/// Names of regular files present in any of the candidates and accepted by `pattern`.
///
/// A candidate that cannot be listed is skipped so the others still contribute.
pub fn scan_available_files(
    work_dir: &Path,
    candidates: &[String],
    pattern: &FilePattern,
) -> Vec<String> {
    let mut names = BTreeSet::new();
    for candidate in candidates {
        let dir = work_dir.join(candidate);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) => {
                log::warn!("Failed to list candidate {}: {}", dir.display(), err);
                continue;
            }
        };
        for entry in entries.flatten() {
            if !entry.file_type().map(|ty| ty.is_file()).unwrap_or(false) {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if pattern.is_match(name) {
                    names.insert(name.to_string());
                }
            }
        }
    }
    names.into_iter().collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Literal(char),
    /// `?`
    One,
    /// `*`, stops at `/`.
    Segment,
    /// `**`
    Any,
}

/// Ant-style file pattern. Matches anywhere inside the name; an empty pattern accepts all.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilePattern {
    tokens: Vec<Token>,
}

impl FilePattern {
    pub fn parse(pattern: &str) -> Self {
        let mut tokens = Vec::new();
        let mut chars = pattern.trim().chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '*' if chars.peek() == Some(&'*') => {
                    chars.next();
                    tokens.push(Token::Any);
                }
                '*' => tokens.push(Token::Segment),
                '?' => tokens.push(Token::One),
                other => tokens.push(Token::Literal(other)),
            }
        }
        Self { tokens }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn is_match(&self, name: &str) -> bool {
        if self.is_empty() {
            return true;
        }
        let text: Vec<char> = name.chars().collect();
        (0..=text.len()).any(|start| match_from(&self.tokens, &text[start..]))
    }
}

fn match_from(tokens: &[Token], text: &[char]) -> bool {
    let Some((first, rest)) = tokens.split_first() else {
        return true;
    };
    match first {
        Token::Literal(c) => text.first() == Some(c) && match_from(rest, &text[1..]),
        Token::One => text.first().is_some_and(|c| *c != '/') && match_from(rest, &text[1..]),
        Token::Segment => {
            let limit = text.iter().position(|c| *c == '/').unwrap_or(text.len());
            (0..=limit).any(|taken| match_from(rest, &text[taken..]))
        }
        Token::Any => (0..=text.len()).any(|taken| match_from(rest, &text[taken..])),
    }
}
