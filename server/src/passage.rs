//! Passage loading for new matches

use crate::error::{RaceError, Result};
use log::debug;
use rand::seq::SliceRandom;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Where the text for a match comes from
#[derive(Debug, Clone)]
pub enum PassageSource {
    /// A single text file used for every match
    File(PathBuf),
    /// A directory of `.txt` files; one is picked at random per match
    Directory(PathBuf),
    /// A fixed passage held in memory
    Inline(String),
}

impl PassageSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        PassageSource::File(path.into())
    }

    pub fn directory(path: impl Into<PathBuf>) -> Self {
        PassageSource::Directory(path.into())
    }

    pub fn inline(text: impl Into<String>) -> Self {
        PassageSource::Inline(text.into())
    }

    /// Picks `File` or `Directory` depending on what the path points at
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if path.is_dir() {
            PassageSource::Directory(path)
        } else {
            PassageSource::File(path)
        }
    }

    /// Loads the passage text for one match, trimmed of surrounding whitespace
    pub async fn load(&self) -> Result<String> {
        let (origin, raw) = match self {
            PassageSource::File(path) => (path.display().to_string(), read_file(path).await?),
            PassageSource::Directory(dir) => {
                let path = pick_from_directory(dir).await?;
                (path.display().to_string(), read_file(&path).await?)
            }
            PassageSource::Inline(text) => ("<inline>".to_string(), text.clone()),
        };

        let text = raw.trim();
        if text.is_empty() {
            return Err(RaceError::EmptyPassage(origin));
        }

        debug!("Loaded passage from {} ({} chars)", origin, passage_length(text));
        Ok(text.to_string())
    }
}

/// Length of a passage as racers count it, in characters
pub fn passage_length(text: &str) -> usize {
    text.chars().count()
}

async fn read_file(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| not_found_or(e, path))
}

async fn pick_from_directory(dir: &Path) -> Result<PathBuf> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| not_found_or(e, dir))?;

    let mut candidates = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "txt") {
            candidates.push(path);
        }
    }
    candidates.sort();

    candidates
        .choose(&mut rand::thread_rng())
        .cloned()
        .ok_or_else(|| RaceError::PassageNotFound(dir.to_path_buf()))
}

fn not_found_or(error: std::io::Error, path: &Path) -> RaceError {
    if error.kind() == ErrorKind::NotFound {
        RaceError::PassageNotFound(path.to_path_buf())
    } else {
        RaceError::Io(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "typerace-passage-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_inline_passage_is_trimmed() {
        let text = PassageSource::inline("  hello world \n").load().await.unwrap();
        assert_eq!(text, "hello world");
    }

    #[tokio::test]
    async fn test_blank_passage_is_rejected() {
        let result = PassageSource::inline(" \n\t ").load().await;
        assert!(matches!(result, Err(RaceError::EmptyPassage(_))));
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let result = PassageSource::file("definitely/not/here.txt").load().await;
        match result {
            Err(RaceError::PassageNotFound(path)) => {
                assert_eq!(path, PathBuf::from("definitely/not/here.txt"));
            }
            other => panic!("Unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_file_passage() {
        let dir = scratch_dir("file");
        let path = dir.join("game_text.txt");
        std::fs::write(&path, "pack my box with five dozen liquor jugs\n").unwrap();

        let text = PassageSource::file(&path).load().await.unwrap();
        assert_eq!(text, "pack my box with five dozen liquor jugs");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_directory_only_picks_txt_files() {
        let dir = scratch_dir("dir");
        std::fs::write(dir.join("one.txt"), "first passage").unwrap();
        std::fs::write(dir.join("notes.md"), "not a passage").unwrap();

        let source = PassageSource::from_path(&dir);
        assert!(matches!(source, PassageSource::Directory(_)));

        for _ in 0..5 {
            assert_eq!(source.load().await.unwrap(), "first passage");
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_empty_directory_is_not_found() {
        let dir = scratch_dir("empty");
        let result = PassageSource::directory(&dir).load().await;
        assert!(matches!(result, Err(RaceError::PassageNotFound(_))));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_passage_length_counts_chars() {
        assert_eq!(passage_length("abc"), 3);
        assert_eq!(passage_length("café"), 4);
    }
}
