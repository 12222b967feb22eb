use std::{collections::HashSet, path::Path, sync::Arc};

use tracing::{debug, info};

use crate::config::Config;
use crate::scrabble::TileSet;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("could not read word list: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not fetch word list: {0}")]
    Http(#[from] reqwest::Error),
    #[error("word list is not a JSON array of strings: {0}")]
    Json(#[from] serde_json::Error),
}

/// Membership test on uppercase words.
pub trait Lexicon {
    fn contains(&self, word: &str) -> bool;
}

impl<L: Lexicon + ?Sized> Lexicon for &L {
    fn contains(&self, word: &str) -> bool {
        (**self).contains(word)
    }
}

impl<L: Lexicon + ?Sized> Lexicon for Arc<L> {
    fn contains(&self, word: &str) -> bool {
        (**self).contains(word)
    }
}

impl Lexicon for HashSet<String> {
    fn contains(&self, word: &str) -> bool {
        HashSet::contains(self, word)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    words: HashSet<String>,
}

impl Dictionary {
    pub fn from_words<I, S>(words: I, tile_set: TileSet) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words = words
            .into_iter()
            .map(|word| word.as_ref().trim().to_owned())
            .filter(|word| !word.is_empty())
            .map(|word| tile_set.uppercase(&word))
            .collect();

        Dictionary { words }
    }

    /// Accepts either one word per line (`//` lines are skipped) or a JSON
    /// array of strings.
    pub fn parse(body: &str, tile_set: TileSet) -> Result<Self, Error> {
        if body.trim_start().starts_with('[') {
            let words: Vec<String> = serde_json::from_str(body)?;
            return Ok(Self::from_words(words, tile_set));
        }

        let words = body
            .lines()
            .filter(|line| !line.trim_start().starts_with("//"));

        Ok(Self::from_words(words, tile_set))
    }

    pub async fn load(path: impl AsRef<Path>, tile_set: TileSet) -> Result<Self, Error> {
        let path = path.as_ref();
        debug!("reading word list from {}", path.display());

        let body = tokio::fs::read_to_string(path).await?;
        Self::parse(&body, tile_set)
    }

    pub async fn fetch(url: &str, tile_set: TileSet) -> Result<Self, Error> {
        debug!("fetching word list from {}", url);

        let body = reqwest::get(url)
            .await?
            .error_for_status()?
            .text()
            .await?;
        Self::parse(&body, tile_set)
    }

    /// The URL wins when both a URL and a path are configured.
    pub async fn from_config(config: &Config) -> Result<Self, Error> {
        let dictionary = match &config.word_list_url {
            Some(url) => Self::fetch(url, config.tile_set).await?,
            None => Self::load(&config.word_list_path, config.tile_set).await?,
        };

        info!("loaded {} words", dictionary.len());
        Ok(dictionary)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl Lexicon for Dictionary {
    fn contains(&self, word: &str) -> bool {
        self.words.contains(word)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_lines() {
        let body = "// turkish word list\nkalem\n\n  masa \nişçi\n// end\n";
        let dictionary = Dictionary::parse(body, TileSet::Turkish).unwrap();

        assert_eq!(dictionary.len(), 3);
        assert!(dictionary.contains("KALEM"));
        assert!(dictionary.contains("MASA"));
        assert!(dictionary.contains("İŞÇİ"));
        assert!(!dictionary.contains("kalem"));
    }

    #[test]
    fn test_parse_json_array() {
        let body = r#"["cat", "Dog", "ox"]"#;
        let dictionary = Dictionary::parse(body, TileSet::English).unwrap();

        assert_eq!(dictionary.len(), 3);
        assert!(dictionary.contains("DOG"));
        assert!(Dictionary::parse("[1, 2]", TileSet::English).is_err());
    }

    #[test]
    fn test_lexicon_through_references() {
        let dictionary = Arc::new(Dictionary::from_words(["AT"], TileSet::English));

        fn check<L: Lexicon + ?Sized>(lexicon: &L, word: &str) -> bool {
            lexicon.contains(word)
        }

        assert!(check(&dictionary, "AT"));
        assert!(check(&&*dictionary, "AT"));
        assert!(!check(&dictionary, "TA"));

        let set: HashSet<String> = ["TA".to_string()].into_iter().collect();
        assert!(check(&set, "TA"));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("words-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, "ev\nyol\n").await.unwrap();

        let dictionary = Dictionary::load(&path, TileSet::Turkish).await.unwrap();
        assert!(dictionary.contains("EV"));
        assert!(dictionary.contains("YOL"));

        tokio::fs::remove_file(&path).await.unwrap();
        assert!(matches!(
            Dictionary::load(&path, TileSet::Turkish).await,
            Err(Error::Io(_))
        ));
    }
}
