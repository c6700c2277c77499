use std::path::{Path, PathBuf};

use anyhow::Result;
use mdbook::utils::new_cmark_parser;
use pulldown_cmark::CodeBlockKind::Fenced;
use pulldown_cmark::{Event, Tag, TagEnd};
use pulldown_cmark_to_cmark::cmark;

use crate::attributes::parse_image_attributes;
use crate::config::{ConfigError, D2Config};
use crate::image::DiagramImage;
use crate::paths::{self, DocumentPaths};
use crate::queue::{CompileHandle, CompileJob, CompileQueue};

/// Rewrites diagram code blocks into images and queues their compilation
pub struct Transformer {
    config: D2Config,
    /// our relative compile path and document paths are resolved against this
    root: PathBuf,
    queue: CompileQueue,
}

/// A document with its diagrams replaced by image references
#[must_use]
pub struct Transformed {
    pub content: String,
    /// number of diagram blocks found, they're named `0.{ext}` to `{diagrams - 1}.{ext}`
    pub diagrams: usize,
    pub compilation: CompileHandle,
}

impl Transformer {
    pub fn new<P: Into<PathBuf>>(
        mut config: D2Config,
        root: P,
        queue: CompileQueue,
    ) -> Result<Self, ConfigError> {
        config.check()?;

        config.compile_path = paths::normalize(&config.compile_path);
        config.link_path = paths::normalize_link(&config.link_path);

        Ok(Self {
            config,
            root: root.into(),
            queue,
        })
    }

    pub fn document_paths(&self, source: Option<&Path>) -> DocumentPaths {
        DocumentPaths::resolve(
            source,
            &self.config.compile_path,
            &self.config.link_path,
            &self.root,
        )
    }

    /// Replace every diagram block in `content` with an image.
    ///
    /// `source` is the document's path, it decides where the diagrams are written. The
    /// content is returned untouched if there are no diagram blocks.
    pub fn transform(&self, content: &str, source: Option<&Path>) -> Result<Transformed> {
        let paths = self.document_paths(source);
        if paths.escapes_root() {
            log::warn!(
                "{}: Diagrams are written outside of {:?}, to {:?}",
                display_source(source),
                self.config.compile_path,
                paths.compile_dir()
            );
        }

        let mut events = Vec::new();
        let mut compilation = CompileHandle::default();
        let mut block_builder: Option<DiagramBlockBuilder> = None;
        let mut image_index = 0;

        for (e, byte_offset) in new_cmark_parser(content, false).into_offset_iter() {
            if let Some(mut builder) = block_builder.take() {
                match e {
                    Event::Text(ref text) => {
                        builder.append_source_code(text);
                        block_builder = Some(builder);
                    }
                    Event::End(TagEnd::CodeBlock) => {
                        let block = builder.build(image_index);
                        image_index += 1;

                        let (image, job) = self.rewrite(&block, &paths, source);
                        events.extend(image.into_events());
                        compilation.merge(self.queue.submit(job));
                    }
                    _ => block_builder = Some(builder),
                }

                continue;
            }

            let opened = match &e {
                Event::Start(Tag::CodeBlock(Fenced(info_string))) => {
                    let info = FenceInfo::parse(info_string);

                    (info.language == self.config.language).then(|| {
                        // add 1 for 0-indexing
                        let line_number = content[..byte_offset.start]
                            .bytes()
                            .filter(|&b| b == b'\n')
                            .count()
                            + 1;

                        DiagramBlockBuilder::new(info.meta.map(str::to_string), line_number)
                    })
                }
                _ => None,
            };

            match opened {
                Some(builder) => block_builder = Some(builder),
                // pass through all events that aren't part of a diagram
                None => events.push(e),
            }
        }

        if image_index == 0 {
            return Ok(Transformed {
                content: content.to_string(),
                diagrams: 0,
                compilation,
            });
        }

        let mut buf = String::with_capacity(content.len());
        cmark(events.into_iter(), &mut buf)?;

        log::debug!(
            "{}: Replaced {image_index} diagrams",
            display_source(source)
        );

        Ok(Transformed {
            content: buf,
            diagrams: image_index,
            compilation,
        })
    }

    fn rewrite(
        &self,
        block: &DiagramBlock,
        paths: &DocumentPaths,
        source: Option<&Path>,
    ) -> (DiagramImage, CompileJob) {
        let file_name = format!("{}.{}", block.index, self.config.ext);
        let url = paths.link(&file_name);

        // any metadata on the block asks for an html image
        let image = if self.config.html_image || block.meta.is_some() {
            DiagramImage::html(
                url,
                &self.config.default_image_attrs,
                parse_image_attributes(block.meta.as_deref()),
            )
        } else {
            DiagramImage::markdown(url, &self.config.default_image_attrs)
        };

        let job = CompileJob {
            source: block.source_code.clone(),
            destination: self.root.join(paths.compile_path(&file_name)),
            location: format!("{}({})", display_source(source), block.line_number),
        };

        (image, job)
    }
}

fn display_source(source: Option<&Path>) -> String {
    source
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "<unknown>".to_string())
}

/// The info string of a fenced code block: ```` ```d2 w=30px;h=20px ````
struct FenceInfo<'a> {
    language: &'a str,
    meta: Option<&'a str>,
}

impl<'a> FenceInfo<'a> {
    fn parse(info_string: &'a str) -> Self {
        let info_string = info_string.trim();
        let (language, meta) = info_string
            .split_once(char::is_whitespace)
            .unwrap_or((info_string, ""));
        let meta = meta.trim();

        FenceInfo {
            language,
            meta: (!meta.is_empty()).then_some(meta),
        }
    }
}

struct DiagramBlock {
    source_code: String,
    meta: Option<String>,
    /// the line of our opening fence
    line_number: usize,
    index: usize,
}

struct DiagramBlockBuilder {
    source_code: String,
    meta: Option<String>,
    line_number: usize,
}

impl DiagramBlockBuilder {
    fn new(meta: Option<String>, line_number: usize) -> Self {
        DiagramBlockBuilder {
            source_code: String::new(),
            meta,
            line_number,
        }
    }

    fn append_source_code(&mut self, code: &str) {
        self.source_code.push_str(code);
    }

    fn build(self, index: usize) -> DiagramBlock {
        DiagramBlock {
            source_code: self.source_code,
            meta: self.meta,
            line_number: self.line_number,
            index,
        }
    }
}
