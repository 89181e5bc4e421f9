use rayon::prelude::*;
use std::collections::VecDeque;
use std::sync::Arc;

use super::request::{format_caption, ScoredImage, SearchRequest};
use crate::arena::{ArenaClient, Block, Channel, ChannelDirectory};
use crate::clip::{ClipScorer, HuggingFaceClip, RetryPolicy};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetch::{HttpImageSource, ImageSource};
use crate::sink::PresentationSink;

pub const NO_MATCHES_NOTICE: &str = "No matches found. Try a broader keyword or lower threshold.";

/// Reference image for [`Pipeline::probe`].
pub const PROBE_IMAGE_URL: &str = "https://upload.wikimedia.org/wikipedia/commons/thumb/e/e4/Watermelon_cross_BNC.jpg/640px-Watermelon_cross_BNC.jpg";
pub const PROBE_PROMPT: &str = "watermelon";

/// Item produced by a [`SearchRun`].
#[derive(Debug, Clone, PartialEq)]
pub enum SearchEvent {
    Match(ScoredImage),
    Warning(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    Matched(usize),
    /// Informational: the search itself worked.
    NoMatches,
}

/// Result of scoring a single known image.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub score: f32,
    pub decodable: bool,
    /// Present only when the image decodes.
    pub caption: Option<String>,
    pub warnings: Vec<String>,
}

/// Keyword → channels → blocks → images → CLIP filter.
#[derive(Clone)]
pub struct Pipeline {
    directory: Arc<dyn ChannelDirectory>,
    images: Arc<dyn ImageSource>,
    scorer: ClipScorer,
}

impl Pipeline {
    pub fn new(
        directory: Arc<dyn ChannelDirectory>,
        images: Arc<dyn ImageSource>,
        scorer: ClipScorer,
    ) -> Self {
        Self {
            directory,
            images,
            scorer,
        }
    }

    /// Wire the HTTP clients from configuration. `api_token` is the resolved
    /// inference credential; the config's own token is not consulted here.
    pub fn from_config(config: &Config, api_token: Option<&str>) -> Self {
        let directory = Arc::new(ArenaClient::from_config(&config.arena, &config.http));
        let images = Arc::new(HttpImageSource::from_config(&config.http));
        let backend = Arc::new(HuggingFaceClip::from_config(
            &config.clip,
            &config.http,
            api_token,
        ));
        let scorer = ClipScorer::new(backend, RetryPolicy::from_config(&config.clip));
        tracing::debug!(
            arena = %config.arena.base_url,
            backend = scorer.backend_name(),
            authenticated = api_token.is_some(),
            "Pipeline configured"
        );

        Self::new(directory, images, scorer)
    }

    /// Start a search. Channel search happens here and is the only fatal step;
    /// everything after it runs lazily as the returned iterator is advanced.
    pub fn search(&self, request: &SearchRequest) -> Result<SearchRun<'_>> {
        request.validate()?;

        let mut channels = self
            .directory
            .search_channels(&request.keyword, request.max_channels)
            .map_err(|e| match e {
                Error::Search(_) => e,
                other => Error::Search(other.to_string()),
            })?;
        channels.truncate(request.max_channels);

        tracing::info!(
            keyword = %request.keyword,
            channels = channels.len(),
            threshold = request.threshold,
            "Channel search complete"
        );

        Ok(SearchRun::new(self, request.clone(), channels))
    }

    /// Run a search to completion and keep only the matches.
    pub fn matching_images(&self, request: &SearchRequest) -> Result<Vec<ScoredImage>> {
        Ok(self
            .search(request)?
            .filter_map(|event| match event {
                SearchEvent::Match(image) => Some(image),
                SearchEvent::Warning(_) => None,
            })
            .collect())
    }

    /// Score one known image against a prompt, bypassing Are.na.
    pub fn probe(&self, url: &str, prompt: &str) -> Result<ProbeReport> {
        let fetched = self.images.fetch(url)?;

        let mut warnings = Vec::new();
        let score = self
            .scorer
            .score(&fetched.bytes, prompt, &mut |w| warnings.push(w));

        let decodable = image::load_from_memory(&fetched.bytes).is_ok();
        let caption = if decodable {
            Some(format!("CLIP Score: {:.2}", score))
        } else {
            warnings.push("Couldn't decode test image.".to_string());
            None
        };

        Ok(ProbeReport {
            score,
            decodable,
            caption,
            warnings,
        })
    }

    /// Fetch, score and validate one block. Never fails; problems come back
    /// as warning events.
    fn process_block(&self, request: &SearchRequest, channel_slug: &str, block: &Block) -> Vec<SearchEvent> {
        let mut events = Vec::new();

        let Some(url) = block.scorable_url() else {
            return events;
        };

        let fetched = match self.images.fetch(url) {
            Ok(fetched) => fetched,
            Err(e) => {
                tracing::warn!(url, error = %e, "Skipping image");
                events.push(SearchEvent::Warning(e.to_string()));
                return events;
            }
        };

        if !fetched.is_image() {
            tracing::debug!(url, content_type = %fetched.content_type, "Not a static image");
            return events;
        }

        let score = self.scorer.score(&fetched.bytes, &request.keyword, &mut |w| {
            events.push(SearchEvent::Warning(w))
        });

        if score < request.threshold {
            tracing::debug!(url, score, "Below threshold");
            return events;
        }

        if let Err(e) = image::load_from_memory(&fetched.bytes) {
            let err = Error::Decode(format!("{}: {}", url, e));
            tracing::warn!(error = %err, "Skipping image");
            events.push(SearchEvent::Warning(err.to_string()));
            return events;
        }

        tracing::info!(url, score, channel = %channel_slug, "Match");
        events.push(SearchEvent::Match(ScoredImage {
            caption: format_caption(block.title.as_deref(), score),
            bytes: fetched.bytes,
            score,
            title: block.title.clone(),
            source_url: url.to_string(),
            channel_slug: channel_slug.to_string(),
        }));
        events
    }
}

/// Lazy sequence of events for one search invocation.
///
/// Sequential runs yield in channel-then-block order. With
/// `parallelism > 1` a whole channel is scored on a bounded thread pool
/// before its events are yielded; treat ordering as best-effort then.
/// Not restartable: a new search re-issues every request.
pub struct SearchRun<'a> {
    pipeline: &'a Pipeline,
    request: SearchRequest,
    channels: std::vec::IntoIter<Channel>,
    current_slug: String,
    blocks: std::vec::IntoIter<Block>,
    pending: VecDeque<SearchEvent>,
    pool: Option<rayon::ThreadPool>,
    matches: usize,
    warnings: usize,
}

impl<'a> SearchRun<'a> {
    fn new(pipeline: &'a Pipeline, request: SearchRequest, channels: Vec<Channel>) -> Self {
        let pool = if request.parallelism > 1 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(request.parallelism)
                .build()
            {
                Ok(pool) => Some(pool),
                Err(e) => {
                    tracing::warn!(error = %e, "Falling back to sequential scoring");
                    None
                }
            }
        } else {
            None
        };

        Self {
            pipeline,
            request,
            channels: channels.into_iter(),
            current_slug: String::new(),
            blocks: Vec::new().into_iter(),
            pending: VecDeque::new(),
            pool,
            matches: 0,
            warnings: 0,
        }
    }

    /// Matches yielded so far.
    pub fn matches(&self) -> usize {
        self.matches
    }

    /// Warnings yielded so far.
    pub fn warnings(&self) -> usize {
        self.warnings
    }

    pub fn request(&self) -> &SearchRequest {
        &self.request
    }

    fn open_channel(&mut self, channel: Channel) {
        let blocks = match self
            .pipeline
            .directory
            .fetch_blocks(&channel.slug, self.request.max_blocks_per_channel)
        {
            Ok(blocks) => blocks,
            Err(e) => {
                tracing::warn!(channel = %channel.slug, error = %e, "Skipping channel");
                self.pending.push_back(SearchEvent::Warning(format!(
                    "skipping channel {}: {}",
                    channel.slug, e
                )));
                return;
            }
        };

        let eligible: Vec<Block> = blocks
            .into_iter()
            .take(self.request.max_blocks_per_channel)
            .filter(|b| b.scorable_url().is_some())
            .collect();

        tracing::debug!(channel = %channel.slug, images = eligible.len(), "Channel contents");

        match &self.pool {
            Some(pool) => {
                let pipeline = self.pipeline;
                let request = &self.request;
                let slug = channel.slug.as_str();
                let per_block: Vec<Vec<SearchEvent>> = pool.install(|| {
                    eligible
                        .par_iter()
                        .map(|block| pipeline.process_block(request, slug, block))
                        .collect()
                });
                self.pending.extend(per_block.into_iter().flatten());
            }
            None => {
                self.current_slug = channel.slug;
                self.blocks = eligible.into_iter();
            }
        }
    }
}

impl Iterator for SearchRun<'_> {
    type Item = SearchEvent;

    fn next(&mut self) -> Option<SearchEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                match event {
                    SearchEvent::Match(_) => self.matches += 1,
                    SearchEvent::Warning(_) => self.warnings += 1,
                }
                return Some(event);
            }

            if let Some(block) = self.blocks.next() {
                let events = self
                    .pipeline
                    .process_block(&self.request, &self.current_slug, &block);
                self.pending.extend(events);
                continue;
            }

            let channel = self.channels.next()?;
            self.open_channel(channel);
        }
    }
}

/// Drive one search into a sink.
///
/// Only an invalid request or a failed channel search returns `Err`; the sink
/// has already been told about it.
pub fn run_search(
    pipeline: &Pipeline,
    request: &SearchRequest,
    sink: &mut dyn PresentationSink,
) -> Result<SearchOutcome> {
    if let Err(e) = request.validate() {
        if let Error::InvalidRequest(ref message) = e {
            sink.warning(message);
        }
        return Err(e);
    }

    sink.begin(request);

    let run = match pipeline.search(request) {
        Ok(run) => run,
        Err(e) => {
            tracing::error!(error = %e, "Search failed");
            sink.error(&e.to_string());
            return Err(e);
        }
    };

    let mut matches = 0;
    for event in run {
        match event {
            SearchEvent::Match(image) => {
                matches += 1;
                sink.render(&image);
            }
            SearchEvent::Warning(message) => sink.warning(&message),
        }
    }

    if matches == 0 {
        sink.notice(NO_MATCHES_NOTICE);
        Ok(SearchOutcome::NoMatches)
    } else {
        Ok(SearchOutcome::Matched(matches))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::ScoringBackend;
    use crate::fetch::FetchedImage;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::sync::Mutex;

    fn jpeg(rgb: [u8; 3]) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(8, 8, image::Rgb(rgb));
        let mut buf = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Jpeg)
            .unwrap();
        buf.into_inner()
    }

    #[derive(Default)]
    struct FakeDirectory {
        blocks: HashMap<String, Vec<Block>>,
        channels: Vec<Channel>,
        block_calls: Mutex<Vec<String>>,
    }

    impl ChannelDirectory for FakeDirectory {
        fn search_channels(&self, _keyword: &str, _limit: usize) -> Result<Vec<Channel>> {
            // Deliberately ignores the limit.
            Ok(self.channels.clone())
        }

        fn fetch_blocks(&self, slug: &str, _limit: usize) -> Result<Vec<Block>> {
            self.block_calls.lock().unwrap().push(slug.to_string());
            self.blocks
                .get(slug)
                .cloned()
                .ok_or_else(|| Error::Channel(format!("{}: HTTP 404: not found", slug)))
        }
    }

    #[derive(Default)]
    struct FakeImages {
        by_url: HashMap<String, FetchedImage>,
    }

    impl ImageSource for FakeImages {
        fn fetch(&self, url: &str) -> Result<FetchedImage> {
            self.by_url
                .get(url)
                .cloned()
                .ok_or_else(|| Error::Fetch(format!("{}: HTTP 404: gone", url)))
        }
    }

    /// Scores by exact image content.
    #[derive(Default)]
    struct FakeClip {
        scores: HashMap<String, f32>,
    }

    impl ScoringBackend for FakeClip {
        fn score_once(&self, image_base64: &str, _prompt: &str) -> Result<f32> {
            self.scores
                .get(image_base64)
                .copied()
                .ok_or_else(|| Error::Inference("CLIP error 500: unknown image".into()))
        }

        fn backend_name(&self) -> &'static str {
            "fake"
        }
    }

    struct Fixture {
        directory: FakeDirectory,
        images: FakeImages,
        clip: FakeClip,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                directory: FakeDirectory::default(),
                images: FakeImages::default(),
                clip: FakeClip::default(),
            }
        }

        fn channel(&mut self, slug: &str, blocks: Vec<Block>) {
            self.directory.channels.push(Channel {
                slug: slug.to_string(),
                title: slug.to_string(),
            });
            self.directory.blocks.insert(slug.to_string(), blocks);
        }

        fn image(&mut self, url: &str, content_type: &str, bytes: Vec<u8>, score: Option<f32>) {
            if let Some(score) = score {
                self.clip.scores.insert(BASE64.encode(&bytes), score);
            }
            self.images.by_url.insert(
                url.to_string(),
                FetchedImage {
                    content_type: content_type.to_string(),
                    bytes,
                },
            );
        }

        fn pipeline(self) -> (Pipeline, Arc<FakeDirectory>) {
            let directory = Arc::new(self.directory);
            let scorer = ClipScorer::new(Arc::new(self.clip), RetryPolicy::immediate(2));
            (
                Pipeline::new(directory.clone(), Arc::new(self.images), scorer),
                directory,
            )
        }
    }

    #[test]
    fn test_sequential_order_is_channel_then_block() {
        let mut fx = Fixture::new();
        fx.channel(
            "a",
            vec![Block::image(Some("a1"), "u:a1"), Block::image(Some("a2"), "u:a2")],
        );
        fx.channel("b", vec![Block::image(Some("b1"), "u:b1")]);
        fx.image("u:a1", "image/jpeg", jpeg([255, 0, 0]), Some(0.9));
        fx.image("u:a2", "image/jpeg", jpeg([0, 255, 0]), Some(0.8));
        fx.image("u:b1", "image/jpeg", jpeg([0, 0, 255]), Some(0.7));
        let (pipeline, _) = fx.pipeline();

        let images = pipeline
            .matching_images(&SearchRequest::new("melon", 0.5))
            .unwrap();
        let titles: Vec<_> = images.iter().filter_map(|i| i.title.as_deref()).collect();
        assert_eq!(titles, vec!["a1", "a2", "b1"]);
    }

    #[test]
    fn test_parallel_run_finds_same_matches() {
        let mut fx = Fixture::new();
        let blocks = (0..6)
            .map(|i| Block::image(Some(format!("t{}", i).as_str()), &format!("u:{}", i)))
            .collect();
        fx.channel("grid", blocks);
        for i in 0..6u8 {
            let score = if i % 2 == 0 { 0.9 } else { 0.1 };
            fx.image(&format!("u:{}", i), "image/png", jpeg([i * 40, 10, 10]), Some(score));
        }
        let (pipeline, _) = fx.pipeline();

        let request = SearchRequest::new("melon", 0.5).with_parallelism(3);
        let mut titles: Vec<_> = pipeline
            .matching_images(&request)
            .unwrap()
            .into_iter()
            .filter_map(|i| i.title)
            .collect();
        titles.sort();
        assert_eq!(titles, vec!["t0", "t2", "t4"]);
    }

    #[test]
    fn test_limits_are_enforced_even_if_directory_ignores_them() {
        let mut fx = Fixture::new();
        fx.channel("a", vec![Block::image(None, "u:1"), Block::image(None, "u:2")]);
        fx.channel("b", vec![Block::image(None, "u:3")]);
        fx.image("u:1", "image/jpeg", jpeg([1, 1, 1]), Some(0.9));
        fx.image("u:2", "image/jpeg", jpeg([90, 90, 90]), Some(0.9));
        fx.image("u:3", "image/jpeg", jpeg([200, 200, 200]), Some(0.9));
        let (pipeline, directory) = fx.pipeline();

        let request = SearchRequest::new("melon", 0.5).with_limits(1, 1);
        let images = pipeline.matching_images(&request).unwrap();

        assert_eq!(images.len(), 1);
        assert_eq!(images[0].source_url, "u:1");
        assert_eq!(*directory.block_calls.lock().unwrap(), vec!["a".to_string()]);
    }

    #[test]
    fn test_broken_links_and_corrupt_images_warn() {
        let mut fx = Fixture::new();
        fx.channel(
            "a",
            vec![
                Block::image(Some("missing"), "u:missing"),
                Block::image(Some("corrupt"), "u:corrupt"),
                Block::image(Some("good"), "u:good"),
            ],
        );
        fx.image("u:corrupt", "image/jpeg", b"not really a jpeg".to_vec(), Some(0.9));
        fx.image("u:good", "image/jpeg", jpeg([10, 20, 30]), Some(0.9));
        let (pipeline, _) = fx.pipeline();

        let mut run = pipeline.search(&SearchRequest::new("melon", 0.5)).unwrap();
        let events: Vec<_> = run.by_ref().collect();

        assert_eq!(run.matches(), 1);
        assert_eq!(run.warnings(), 2);
        assert!(matches!(&events[0], SearchEvent::Warning(w) if w.contains("u:missing")));
        assert!(matches!(&events[1], SearchEvent::Warning(w) if w.starts_with("image decode failed")));
        assert!(matches!(&events[2], SearchEvent::Match(img) if img.source_url == "u:good"));
    }

    #[test]
    fn test_scorer_failures_are_warnings_and_no_match() {
        let mut fx = Fixture::new();
        fx.channel("a", vec![Block::image(None, "u:unscored")]);
        fx.image("u:unscored", "image/jpeg", jpeg([5, 5, 5]), None);
        let (pipeline, _) = fx.pipeline();

        let events: Vec<_> = pipeline
            .search(&SearchRequest::new("melon", 0.1))
            .unwrap()
            .collect();

        // Two attempts, two warnings, no match.
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|e| matches!(e, SearchEvent::Warning(w) if w.starts_with("CLIP error 500"))));
    }

    #[test]
    fn test_non_image_blocks_are_never_fetched() {
        let mut fx = Fixture::new();
        fx.channel(
            "a",
            vec![Block {
                kind: crate::arena::BlockKind::Other,
                title: Some("essay".into()),
                image_url: Some("u:text".into()),
            }],
        );
        let (pipeline, _) = fx.pipeline();

        // "u:text" is not registered: fetching it would produce a warning.
        let events: Vec<_> = pipeline
            .search(&SearchRequest::new("melon", 0.1))
            .unwrap()
            .collect();
        assert!(events.is_empty());
    }

    #[test]
    fn test_invalid_request_never_searches() {
        let (pipeline, directory) = Fixture::new().pipeline();
        let err = pipeline.search(&SearchRequest::new("", 0.3)).err().unwrap();
        assert!(matches!(err, Error::InvalidRequest(_)));
        assert!(directory.block_calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_probe_reports_score_and_decodability() {
        let mut fx = Fixture::new();
        fx.image(PROBE_IMAGE_URL, "image/jpeg", jpeg([200, 40, 60]), Some(0.27));
        fx.image("u:junk", "image/jpeg", b"junk".to_vec(), Some(0.9));
        let (pipeline, _) = fx.pipeline();

        let report = pipeline.probe(PROBE_IMAGE_URL, PROBE_PROMPT).unwrap();
        assert!(report.decodable);
        assert_eq!(report.caption.as_deref(), Some("CLIP Score: 0.27"));
        assert!(report.warnings.is_empty());

        let junk = pipeline.probe("u:junk", PROBE_PROMPT).unwrap();
        assert!(!junk.decodable);
        assert_eq!(junk.caption, None);
        assert_eq!(junk.warnings, vec!["Couldn't decode test image.".to_string()]);

        assert!(matches!(pipeline.probe("u:nowhere", PROBE_PROMPT), Err(Error::Fetch(_))));
    }
}
