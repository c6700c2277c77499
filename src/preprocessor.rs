use std::sync::Arc;

use anyhow::{anyhow, Result};
use mdbook::book::Book;
use mdbook::preprocess::{Preprocessor, PreprocessorContext};
use mdbook::{BookItem, Config};

use crate::compiler::D2Cli;
use crate::config::D2Config;
use crate::queue::{CompileFailure, CompileHandle, CompileQueue, CompileReport};
use crate::transform::Transformer;

pub static PREPROCESSOR_NAME: &str = "d2-image";

pub struct D2ImagePreprocessor;

impl Preprocessor for D2ImagePreprocessor {
    fn name(&self) -> &str {
        PREPROCESSOR_NAME
    }

    fn run(&self, ctx: &PreprocessorContext, mut book: Book) -> Result<Book> {
        let config = load_config(&ctx.config, self.name())?;
        let fail_on_error = config.fail_on_error;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        let queue = CompileQueue::new(
            Arc::new(D2Cli::from_config(&config)),
            config.max_concurrency,
            runtime.handle().clone(),
        );
        let transformer = Transformer::new(config, &ctx.root, queue)?;

        let compilation = rewrite_book(&transformer, &mut book)?;

        // we exit as soon as the book is written out, so every diagram has to be done by then
        let report = runtime.block_on(compilation.wait());
        check_report(&report, fail_on_error)?;

        Ok(book)
    }

    fn supports_renderer(&self, _renderer: &str) -> bool {
        // since we're just outputting markdown images or inline html, this "should" support any renderer
        true
    }
}

pub fn load_config(config: &Config, name: &str) -> Result<D2Config> {
    Ok(config
        .get_deserialized_opt(format!("preprocessor.{name}"))?
        .unwrap_or_default())
}

/// Replace the diagrams of every chapter, returning the compilations they started
pub fn rewrite_book(transformer: &Transformer, book: &mut Book) -> Result<CompileHandle> {
    let mut compilation = CompileHandle::default();
    let mut error = Ok(());

    book.for_each_mut(|item: &mut BookItem| {
        // only continue editing the book if we don't have any errors
        if error.is_ok() {
            if let BookItem::Chapter(ref mut chapter) = item {
                error = transformer
                    .transform(&chapter.content, chapter.path.as_deref())
                    .map(|transformed| {
                        chapter.content = transformed.content;
                        compilation.merge(transformed.compilation);
                    });
            }
        }
    });

    error.map(|_| compilation)
}

/// Log every failed diagram, failing if we're configured to
pub fn check_report(report: &CompileReport, fail_on_error: bool) -> Result<()> {
    for CompileFailure {
        location,
        destination,
        snippet,
        error,
    } in &report.failures
    {
        if fail_on_error {
            log::error!("{location}: Failed to compile `{snippet}` into {destination:?}: {error}");
        } else {
            log::warn!("{location}: Failed to compile `{snippet}` into {destination:?}: {error}");
        }
    }

    if !report.compiled.is_empty() {
        log::info!("Compiled {} diagrams", report.compiled.len());
    }

    if fail_on_error && !report.is_success() {
        let failed = report.failures.len();
        Err(anyhow!(
            "{failed} {} failed to compile",
            if failed == 1 { "diagram" } else { "diagrams" }
        ))
    } else {
        Ok(())
    }
}
