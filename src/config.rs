use std::path::{Component, Path, PathBuf};
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::attributes::ImageAttributes;
use crate::image::ALT_ATTRIBUTE;

pub const DEFAULT_LANGUAGE: &str = "d2";
pub const DEFAULT_COMPILE_PATH: &str = "static/d2";
pub const DEFAULT_EXT: &str = "svg";
pub const DEFAULT_LINK_PATH: &str = "/d2";
pub const DEFAULT_COMPILER: &str = "d2";
pub const DEFAULT_COMPILER_OPTIONS: [&str; 2] = ["-t=100", "--dark-theme=200"];
pub const DEFAULT_ALT: &str = "d2 diagram";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// `[preprocessor.d2-image]` options
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct D2Config {
    /// language a fenced code block must declare to be compiled
    pub language: String,
    /// directory our compiled diagrams are written to
    pub compile_path: PathBuf,
    /// allow `compile_path` to be absolute
    #[serde(rename = "unsafe")]
    pub allow_unsafe: bool,
    pub ext: String,
    /// prefix of every generated image url
    pub link_path: String,
    pub compiler: String,
    pub compiler_options: Vec<String>,
    /// always output `<img />` tags, even for blocks without metadata
    pub html_image: bool,
    pub default_image_attrs: ImageAttributes,
    /// seconds a single compilation may take
    pub timeout: u64,
    pub max_concurrency: usize,
    /// fail the build when a diagram can't be compiled
    pub fail_on_error: bool,
}

impl Default for D2Config {
    fn default() -> Self {
        D2Config {
            language: DEFAULT_LANGUAGE.to_string(),
            compile_path: PathBuf::from(DEFAULT_COMPILE_PATH),
            allow_unsafe: false,
            ext: DEFAULT_EXT.to_string(),
            link_path: DEFAULT_LINK_PATH.to_string(),
            compiler: DEFAULT_COMPILER.to_string(),
            compiler_options: DEFAULT_COMPILER_OPTIONS
                .iter()
                .map(|o| o.to_string())
                .collect(),
            html_image: false,
            default_image_attrs: ImageAttributes::from([(
                ALT_ATTRIBUTE.to_string(),
                DEFAULT_ALT.to_string(),
            )]),
            timeout: DEFAULT_TIMEOUT_SECS,
            max_concurrency: thread::available_parallelism()
                .map(usize::from)
                .unwrap_or(1),
            fail_on_error: true,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error(
        "compile-path {0:?} is an absolute path and unsafe is false, set unsafe = true to allow it"
    )]
    UnsafeCompilePath(PathBuf),
    #[error("ext {0:?} must be a plain file extension")]
    InvalidExtension(String),
    #[error("max-concurrency must be at least 1")]
    ZeroConcurrency,
}

impl D2Config {
    /// Validate our options before any document is processed
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.compile_path.is_absolute() && !self.allow_unsafe {
            return Err(ConfigError::UnsafeCompilePath(self.compile_path.clone()));
        }

        let ext = Path::new(&self.ext);
        let mut components = ext.components();
        if self.ext.is_empty()
            || self.ext.contains(['/', '\\'])
            || !matches!(
                (components.next(), components.next()),
                (Some(Component::Normal(_)), None)
            )
        {
            return Err(ConfigError::InvalidExtension(self.ext.clone()));
        }

        if self.max_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }

        Ok(())
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}
