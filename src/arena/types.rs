use serde::{Deserialize, Serialize};

/// A named collection of blocks returned by channel search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub slug: String,
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    Image,
    Other,
}

impl BlockKind {
    /// Map an Are.na `class` field. Anything but `"Image"` is `Other`.
    pub fn from_class(class: Option<&str>) -> Self {
        match class {
            Some("Image") => BlockKind::Image,
            _ => BlockKind::Other,
        }
    }
}

/// One content item of a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub kind: BlockKind,
    pub title: Option<String>,
    pub image_url: Option<String>,
}

impl Block {
    pub fn image(title: Option<&str>, url: &str) -> Self {
        Self {
            kind: BlockKind::Image,
            title: title.map(|t| t.to_string()),
            image_url: Some(url.to_string()),
        }
    }

    /// URL to download when this block is worth scoring.
    pub fn scorable_url(&self) -> Option<&str> {
        match (self.kind, self.image_url.as_deref()) {
            (BlockKind::Image, Some(url)) if !url.trim().is_empty() => Some(url),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_class() {
        assert_eq!(BlockKind::from_class(Some("Image")), BlockKind::Image);
        assert_eq!(BlockKind::from_class(Some("Text")), BlockKind::Other);
        assert_eq!(BlockKind::from_class(Some("image")), BlockKind::Other);
        assert_eq!(BlockKind::from_class(None), BlockKind::Other);
    }

    #[test]
    fn test_scorable_url() {
        let block = Block::image(Some("melon"), "https://img.example/a.jpg");
        assert_eq!(block.scorable_url(), Some("https://img.example/a.jpg"));

        let no_url = Block {
            kind: BlockKind::Image,
            title: None,
            image_url: Some("  ".to_string()),
        };
        assert_eq!(no_url.scorable_url(), None);

        let link = Block {
            kind: BlockKind::Other,
            title: None,
            image_url: Some("https://img.example/b.jpg".to_string()),
        };
        assert_eq!(link.scorable_url(), None);
    }
}
