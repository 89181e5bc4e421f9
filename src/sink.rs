//! Presentation sinks: where matches, warnings and notices end up.

use std::io::Write;
use std::path::PathBuf;

use crate::pipeline::{ScoredImage, SearchRequest};

/// Consumer of one search invocation's output.
///
/// Rendering is up to the implementation; the pipeline only promises that
/// every rendered image cleared the threshold and decodes.
pub trait PresentationSink {
    /// Called once before any network request, with the effective request.
    fn begin(&mut self, _request: &SearchRequest) {}

    fn render(&mut self, image: &ScoredImage);

    /// Advisory, non-blocking problem (skipped channel, broken image, CLIP retry).
    fn warning(&mut self, message: &str);

    /// Informational message, e.g. "no matches".
    fn notice(&mut self, message: &str);

    /// Terminal failure of the invocation.
    fn error(&mut self, message: &str);
}

/// Writes captions to a text stream and optionally saves matched images.
pub struct ConsoleSink<W: Write> {
    out: W,
    save_dir: Option<PathBuf>,
    rendered: usize,
    saved: Vec<PathBuf>,
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            save_dir: None,
            rendered: 0,
            saved: Vec::new(),
        }
    }

    pub fn with_save_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.save_dir = dir;
        self
    }

    pub fn rendered(&self) -> usize {
        self.rendered
    }

    pub fn saved(&self) -> &[PathBuf] {
        &self.saved
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{}", text) {
            tracing::warn!(error = %e, "Failed to write to console");
        }
    }

    fn save(&mut self, image: &ScoredImage) {
        let Some(dir) = self.save_dir.clone() else {
            return;
        };

        let extension = image::guess_format(&image.bytes)
            .ok()
            .and_then(|f| f.extensions_str().first().copied())
            .unwrap_or("img");
        let path = dir.join(format!(
            "{:03}-{}.{}",
            self.rendered,
            sanitize_file_stem(&image.channel_slug),
            extension
        ));

        let result = std::fs::create_dir_all(&dir).and_then(|_| std::fs::write(&path, &image.bytes));
        match result {
            Ok(()) => {
                self.line(&format!("  saved {}", path.display()));
                self.saved.push(path);
            }
            Err(e) => {
                tracing::warn!(path = ?path, error = %e, "Failed to save image");
                self.warning(&format!("could not save {}: {}", path.display(), e));
            }
        }
    }
}

impl<W: Write> PresentationSink for ConsoleSink<W> {
    fn begin(&mut self, request: &SearchRequest) {
        self.line(&format!(
            "Searching for images visually similar to: {} (threshold {:.2})",
            request.keyword, request.threshold
        ));
    }

    fn render(&mut self, image: &ScoredImage) {
        self.rendered += 1;
        self.line(&format!("[{}] {}", self.rendered, image.caption.replace('\n', " | ")));
        self.line(&format!("  {} ({})", image.source_url, image.channel_slug));
        self.save(image);
    }

    fn warning(&mut self, message: &str) {
        self.line(&format!("warning: {}", message));
    }

    fn notice(&mut self, message: &str) {
        self.line(message);
    }

    fn error(&mut self, message: &str) {
        self.line(&format!("error: {}", message));
    }
}

/// Keep `[A-Za-z0-9_-]`, replace everything else with `_`.
fn sanitize_file_stem(raw: &str) -> String {
    let stem: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if stem.is_empty() {
        "channel".to_string()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(2, 2, image::Rgb([10, 200, 10]));
        let mut buf = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn scored(bytes: Vec<u8>) -> ScoredImage {
        ScoredImage {
            bytes,
            caption: "Melon\nScore: 0.42".to_string(),
            score: 0.42,
            title: Some("Melon".to_string()),
            source_url: "https://img.example/melon.png".to_string(),
            channel_slug: "fruit-zine".to_string(),
        }
    }

    #[test]
    fn test_render_writes_caption_on_one_line() {
        let mut sink = ConsoleSink::new(Vec::new());
        sink.render(&scored(png_bytes()));
        sink.notice("done");

        assert_eq!(sink.rendered(), 1);
        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert!(text.contains("[1] Melon | Score: 0.42"));
        assert!(text.contains("https://img.example/melon.png (fruit-zine)"));
        assert!(text.ends_with("done\n"));
    }

    #[test]
    fn test_render_saves_with_guessed_extension() {
        let dir = tempdir().unwrap();
        let out_dir = dir.path().join("matches");
        let mut sink = ConsoleSink::new(Vec::new()).with_save_dir(Some(out_dir.clone()));

        let bytes = png_bytes();
        sink.render(&scored(bytes.clone()));

        assert_eq!(sink.saved(), &[out_dir.join("001-fruit-zine.png")]);
        assert_eq!(std::fs::read(&sink.saved()[0]).unwrap(), bytes);
    }

    #[test]
    fn test_sanitize_file_stem() {
        assert_eq!(sanitize_file_stem("fruit-zine"), "fruit-zine");
        assert_eq!(sanitize_file_stem("../etc/passwd"), "___etc_passwd");
        assert_eq!(sanitize_file_stem(""), "channel");
    }
}
