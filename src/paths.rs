//! Where compiled diagrams go on disk and how the book links to them.
//!
//! Every document gets its own directory under the compile and link roots, named
//! after the document path without its extension: `docs/guide.md` compiles to
//! `static/d2/docs/guide/0.svg` and is linked as `/d2/docs/guide/0.svg`.

use std::path::{Component, Path, PathBuf};

const URL_SEPARATOR: char = '/';

/// Lexically collapse `.` and `..` components.
///
/// `..` can't climb above the root of an absolute path, but is kept at the
/// start of a relative one. An empty result is `.`.
pub fn normalize(path: &Path) -> PathBuf {
    let mut components: Vec<Component> = vec![];

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match components.last().copied() {
                Some(Component::Normal(_)) => {
                    components.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                Some(Component::ParentDir) | Some(Component::CurDir) | None => {
                    components.push(component)
                }
            },
            component => components.push(component),
        }
    }

    if components.is_empty() {
        PathBuf::from(".")
    } else {
        components.into_iter().collect()
    }
}

/// The relative path leading from `base` to `path`. Both are expected to be absolute
pub fn relative_to(path: &Path, base: &Path) -> PathBuf {
    let path = normalize(path);
    let base = normalize(base);

    let mut path_components = path.components().peekable();
    let mut base_components = base.components().peekable();

    // skip our shared prefix
    while let (Some(p), Some(b)) = (path_components.peek(), base_components.peek()) {
        if p != b {
            break;
        }
        path_components.next();
        base_components.next();
    }

    base_components
        .map(|_| Component::ParentDir)
        .chain(path_components)
        .collect()
}

/// [`normalize`] for `/` separated url paths
pub fn normalize_link(link: &str) -> String {
    let absolute = link.starts_with(URL_SEPARATOR);
    let mut segments: Vec<&str> = vec![];

    for segment in link.split(URL_SEPARATOR) {
        match segment {
            "" | "." => {}
            ".." => match segments.last().copied() {
                Some("..") => segments.push(segment),
                Some(_) => {
                    segments.pop();
                }
                None if !absolute => segments.push(segment),
                None => {}
            },
            segment => segments.push(segment),
        }
    }

    let joined = segments.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Join url segments and normalize the result
pub fn join_link(base: &str, relative: &str) -> String {
    normalize_link(&format!("{base}{URL_SEPARATOR}{relative}"))
}

fn path_to_link(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(segment) => Some(segment.to_string_lossy()),
            Component::ParentDir => Some("..".into()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// The directory our document's diagrams compile into and the url they're linked from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPaths {
    relative_dir: PathBuf,
    compile_dir: PathBuf,
    link_dir: String,
}

impl DocumentPaths {
    /// `source` is the document path, relative to `cwd` unless absolute.
    pub fn resolve(source: Option<&Path>, compile_path: &Path, link_path: &str, cwd: &Path) -> Self {
        let relative_dir = source
            .map(|source| {
                let mut document_dir = source.parent().map(Path::to_path_buf).unwrap_or_default();
                if let Some(stem) = source.file_stem() {
                    document_dir.push(stem);
                }

                if source.is_absolute() {
                    relative_to(&document_dir, cwd)
                } else {
                    document_dir
                }
            })
            .unwrap_or_default();
        let relative_dir = normalize(&relative_dir);

        DocumentPaths {
            compile_dir: normalize(&compile_path.join(&relative_dir)),
            link_dir: join_link(link_path, &path_to_link(&relative_dir)),
            relative_dir,
        }
    }

    pub fn compile_dir(&self) -> &Path {
        &self.compile_dir
    }

    pub fn link_dir(&self) -> &str {
        &self.link_dir
    }

    /// Does this document climb out of our compile root
    pub fn escapes_root(&self) -> bool {
        matches!(
            self.relative_dir.components().next(),
            Some(Component::ParentDir)
        )
    }

    pub fn compile_path(&self, file_name: &str) -> PathBuf {
        self.compile_dir.join(file_name)
    }

    pub fn link(&self, file_name: &str) -> String {
        join_link(&self.link_dir, file_name)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn resolve(source: Option<&str>, compile_path: &str, link_path: &str) -> DocumentPaths {
        DocumentPaths::resolve(
            source.map(Path::new),
            Path::new(compile_path),
            link_path,
            Path::new("/home/user/book"),
        )
    }

    #[test]
    fn normalize_paths() {
        for (path, expected) in [
            ("static/d2", "static/d2"),
            ("static/d2/cool/dream/..", "static/d2/cool"),
            ("./static/./d2/", "static/d2"),
            ("a/../..", ".."),
            ("../a/../../b", "../../b"),
            ("", "."),
            (".", "."),
            ("a/..", "."),
        ] {
            assert_eq!(normalize(Path::new(path)), PathBuf::from(expected), "{path:?}");
        }
    }

    #[cfg(unix)]
    #[test]
    fn normalize_absolute_paths() {
        assert_eq!(normalize(Path::new("/../a/./b/..")), PathBuf::from("/a"));
        assert_eq!(normalize(Path::new("/..")), PathBuf::from("/"));
    }

    #[test]
    fn normalize_links() {
        for (link, expected) in [
            ("/d2", "/d2"),
            ("/a/link/super/../path", "/a/link/path"),
            ("/d2/", "/d2"),
            ("/../d2", "/d2"),
            ("d2/../..", ".."),
            ("./d2", "d2"),
            ("", "."),
            ("/", "/"),
            ("//d2//x", "/d2/x"),
        ] {
            assert_eq!(normalize_link(link), expected, "{link:?}");
        }
    }

    #[cfg(unix)]
    #[test]
    fn relative_paths() {
        for (path, base, expected) in [
            ("/home/user/book/docs/guide", "/home/user/book", "docs/guide"),
            ("/home/user/other/guide", "/home/user/book", "../other/guide"),
            ("/home/user/book", "/home/user/book", ""),
            ("/home/user/book/./a/../b", "/home/user/book/", "b"),
        ] {
            assert_eq!(
                relative_to(Path::new(path), Path::new(base)),
                PathBuf::from(expected),
                "{path:?} from {base:?}"
            );
        }
    }

    #[test]
    fn without_source() {
        let paths = resolve(None, "static/d2", "/d2");

        assert_eq!(paths.relative_dir, Path::new("."));
        assert_eq!(paths.compile_dir(), Path::new("static/d2"));
        assert_eq!(paths.link_dir(), "/d2");
        assert_eq!(paths.link("0.svg"), "/d2/0.svg");
        assert_eq!(paths.compile_path("0.svg"), PathBuf::from("static/d2/0.svg"));
    }

    #[test]
    fn relative_source() {
        let paths = resolve(Some("docs/guide.md"), "static/d2", "/d2");

        assert_eq!(paths.relative_dir, Path::new("docs/guide"));
        assert_eq!(paths.compile_dir(), Path::new("static/d2/docs/guide"));
        assert_eq!(paths.link_dir(), "/d2/docs/guide");
        assert_eq!(paths.link("1.svg"), "/d2/docs/guide/1.svg");
        assert_eq!(
            paths.compile_path("1.svg"),
            PathBuf::from("static/d2/docs/guide/1.svg")
        );
        assert!(!paths.escapes_root());
    }

    #[test]
    fn only_the_last_extension_is_dropped() {
        let paths = resolve(Some("notes.v2.md"), "static/d2", "/d2");

        assert_eq!(paths.link_dir(), "/d2/notes.v2");
    }

    #[cfg(unix)]
    #[test]
    fn absolute_source_is_relative_to_cwd() {
        let paths = resolve(Some("/home/user/book/docs/guide.md"), "static/d2", "/d2");

        assert_eq!(paths.compile_dir(), Path::new("static/d2/docs/guide"));
        assert_eq!(paths.link_dir(), "/d2/docs/guide");
    }

    #[cfg(unix)]
    #[test]
    fn escaping_source() {
        let paths = resolve(Some("/home/user/notes/todo.md"), "static/d2", "/d2");

        assert!(paths.escapes_root());
        assert_eq!(paths.compile_dir(), Path::new("static/notes/todo"));
        assert_eq!(paths.link_dir(), "/notes/todo");
    }

    #[test]
    fn redundant_segments_resolve_like_clean_roots() {
        let clean = resolve(Some("docs/guide.md"), "static/d2/cool", "/a/link/path");
        let messy = resolve(
            Some("./docs/../docs/guide.md"),
            "static/d2/cool/dream/..",
            "/a/link/super/../path",
        );

        assert_eq!(clean.compile_dir(), messy.compile_dir());
        assert_eq!(clean.link_dir(), messy.link_dir());
    }

    #[test]
    fn deterministic() {
        assert_eq!(
            resolve(Some("docs/guide.md"), "static/d2", "/d2"),
            resolve(Some("docs/guide.md"), "static/d2", "/d2")
        );
    }
}
