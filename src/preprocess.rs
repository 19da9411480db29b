//! Preprocessors: normalize a resource container's source tree into
//! canonical single-file-per-unit outputs plus a rewritten manifest.
//!
//! Source repositories arrive in wildly different shapes: one file per book,
//! a flat directory of finished files, or chapter directories full of chunk
//! files. Each preprocessor variant reassembles its resource type into the
//! canonical form the converter modules expect. Construction always persists
//! the manifest into the output directory; downstream stages read it from
//! there, never from the source tree.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, info, warn};

use crate::bible_books::book_number;
use crate::file_utils::{
    copy_file, read_file, sorted_dir_names, sorted_file_names, sorted_files_with_ext, write_file,
};
use crate::resource_container::{
    Project, ProjectConfig, ResourceContainer, TocSection, BIBLE_RESOURCE_TYPES,
};

/// Directories never scanned for chapters.
pub const IGNORE_DIRECTORIES: [&str; 2] = [".git", "00"];

/// Filenames never copied or treated as chunks.
pub const IGNORE_FILES: [&str; 5] = [
    ".DS_Store",
    "reference.txt",
    "title.txt",
    "LICENSE.md",
    "README.md",
];

#[derive(Debug)]
pub enum PreprocessError {
    Io(io::Error),
    Manifest(serde_yaml::Error),
}

impl fmt::Display for PreprocessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreprocessError::Io(e) => write!(f, "io error: {e}"),
            PreprocessError::Manifest(e) => write!(f, "manifest serialization failed: {e}"),
        }
    }
}

impl std::error::Error for PreprocessError {}

impl From<io::Error> for PreprocessError {
    fn from(e: io::Error) -> Self {
        PreprocessError::Io(e)
    }
}

/// Common contract of the preprocessor family.
///
/// `run` populates the output directory and reports overall success. The
/// book accessors feed the deployment stage's multi-part-merge decision;
/// only the Bible variant produces anything there.
pub trait Preprocess {
    fn run(&mut self) -> Result<bool, PreprocessError>;

    fn is_multiple_jobs(&self) -> bool {
        false
    }

    fn book_list(&self) -> Option<Vec<String>> {
        None
    }
}

/// Selects the preprocessor variant for a container and runs it.
pub fn do_preprocess(
    rc: ResourceContainer,
    source_dir: &Path,
    output_dir: &Path,
) -> Result<(bool, Box<dyn Preprocess>), PreprocessError> {
    let mut preprocessor = for_container(rc, source_dir, output_dir)?;
    let success = preprocessor.run()?;
    Ok((success, preprocessor))
}

/// Closed dispatch from the resource identifier to a concrete variant.
pub fn for_container(
    rc: ResourceContainer,
    source_dir: &Path,
    output_dir: &Path,
) -> Result<Box<dyn Preprocess>, PreprocessError> {
    let identifier = rc.resource().identifier.clone();
    info!(resource = %identifier, "Selecting preprocessor");
    let preprocessor: Box<dyn Preprocess> = if identifier == "obs" {
        Box::new(ObsPreprocessor::new(rc, source_dir, output_dir)?)
    } else if BIBLE_RESOURCE_TYPES.contains(&identifier.as_str()) {
        Box::new(BiblePreprocessor::new(rc, source_dir, output_dir)?)
    } else if identifier == "ta" {
        Box::new(TaPreprocessor::new(rc, source_dir, output_dir)?)
    } else {
        Box::new(Preprocessor::new(rc, source_dir, output_dir)?)
    };
    Ok(preprocessor)
}

fn read_text(path: &Path) -> Option<String> {
    match read_file(path) {
        Ok(content) => Some(content),
        Err(e) => {
            warn!(error = ?e, path = %path.display(), "Unreadable content file");
            None
        }
    }
}

/// Drops a trailing " <digits>" suffix, e.g. "Titus 01" -> "Titus".
fn strip_trailing_number(title: &str) -> String {
    let trimmed = title.trim();
    let without_digits = trimmed.trim_end_matches(|c: char| c.is_ascii_digit());
    if without_digits.len() < trimmed.len() && without_digits.ends_with(' ') {
        without_digits.trim_end().to_string()
    } else {
        trimmed.to_string()
    }
}

/// The default preprocessor, and the shared construction every variant
/// inherits: writing the serialized manifest into the output directory.
pub struct Preprocessor {
    rc: ResourceContainer,
    source_dir: PathBuf,
    output_dir: PathBuf,
}

impl Preprocessor {
    pub fn new(
        rc: ResourceContainer,
        source_dir: &Path,
        output_dir: &Path,
    ) -> Result<Self, PreprocessError> {
        std::fs::create_dir_all(output_dir)?;
        let manifest = rc.manifest_yaml().map_err(PreprocessError::Manifest)?;
        write_file(&output_dir.join("manifest.yaml"), &manifest)?;
        Ok(Self {
            rc,
            source_dir: source_dir.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
        })
    }

    fn project_path(&self, project: &Project) -> PathBuf {
        self.source_dir.join(&project.path)
    }
}

impl Preprocess for Preprocessor {
    fn run(&mut self) -> Result<bool, PreprocessError> {
        let ext = self.rc.resource().file_ext.clone();
        for (index, project) in self.rc.projects().iter().enumerate() {
            let project_path = self.source_dir.join(&project.path);

            if project_path.is_file() {
                // Case 1: the project is a single file, copied to the
                // canonical name.
                let filename = match book_number(&project.identifier.to_lowercase()) {
                    Some(number) => {
                        format!("{}-{}.{}", number, project.identifier.to_uppercase(), ext)
                    }
                    None => format!("{:02}-{}.{}", index + 1, project.identifier, ext),
                };
                copy_file(&project_path, &self.output_dir.join(filename))?;
                continue;
            }

            // Case 2: a directory of already-final files.
            let files = sorted_files_with_ext(&project_path, &ext);
            if !files.is_empty() {
                for name in files {
                    let output_path = self.output_dir.join(&name);
                    if !output_path.exists() && !IGNORE_FILES.contains(&name.as_str()) {
                        copy_file(&project_path.join(&name), &output_path)?;
                    }
                }
                continue;
            }

            // Case 3: chapter directories of chunk files, pieced together in
            // lexical chunk order. No chapters is not an error.
            let chapters = self.rc.chapters(&project.identifier);
            if chapters.is_empty() {
                continue;
            }
            let mut text = String::new();
            for chapter in &chapters {
                for chunk in self.rc.chunks(&project.identifier, chapter) {
                    if let Some(content) = read_text(&project_path.join(chapter).join(&chunk)) {
                        text.push_str(&content);
                        text.push_str("\n\n");
                    }
                }
            }
            let filename = match book_number(&project.identifier.to_lowercase()) {
                Some(number) => {
                    format!("{}-{}.{}", number, project.identifier.to_uppercase(), ext)
                }
                None => format!("{:02}-{}.{}", index + 1, project.identifier, ext),
            };
            write_file(&self.output_dir.join(filename), &text)?;
        }
        Ok(true)
    }
}

struct ObsFrame {
    id: String,
    text: String,
}

struct ObsChapter {
    id: String,
    title: String,
    reference: String,
    frames: Vec<ObsFrame>,
}

/// Open Bible Stories: one markdown document per story chapter.
pub struct ObsPreprocessor {
    base: Preprocessor,
}

impl ObsPreprocessor {
    pub fn new(
        rc: ResourceContainer,
        source_dir: &Path,
        output_dir: &Path,
    ) -> Result<Self, PreprocessError> {
        Ok(Self {
            base: Preprocessor::new(rc, source_dir, output_dir)?,
        })
    }

    fn chapter_title(project_path: &Path, chapter: &str) -> String {
        let title_file = project_path.join(chapter).join("title.txt");
        if title_file.exists() {
            if let Some(contents) = read_text(&title_file) {
                return contents.trim().to_string();
            }
        }
        // No title file: the story number with a period stands in.
        format!("{}. ", chapter.trim_start_matches('0'))
    }

    fn chapter_reference(project_path: &Path, chapter: &str) -> String {
        let reference_file = project_path.join(chapter).join("reference.txt");
        if reference_file.exists() {
            if let Some(contents) = read_text(&reference_file) {
                return contents.trim().to_string();
            }
        }
        String::new()
    }

    fn chapter_frames(project_path: &Path, chapter: &str) -> Vec<ObsFrame> {
        let chapter_dir = project_path.join(chapter);
        let mut frames = Vec::new();
        for name in sorted_file_names(&chapter_dir) {
            if IGNORE_FILES.contains(&name.as_str()) {
                continue;
            }
            let stem = Path::new(&name)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(&name)
                .to_string();
            let text = read_text(&chapter_dir.join(&name)).unwrap_or_default();
            frames.push(ObsFrame {
                id: format!("{}-{}", chapter, stem),
                text,
            });
        }
        frames
    }

    fn chapters(project_path: &Path) -> Vec<ObsChapter> {
        sorted_dir_names(project_path)
            .into_iter()
            .filter(|name| !IGNORE_DIRECTORIES.contains(&name.as_str()))
            .map(|chapter| ObsChapter {
                title: Self::chapter_title(project_path, &chapter),
                reference: Self::chapter_reference(project_path, &chapter),
                frames: Self::chapter_frames(project_path, &chapter),
                id: chapter,
            })
            .collect()
    }

    /// Chunked story repositories keep per-frame text files under each
    /// chapter; the probe is whether chapter 1 carries any of the well-known
    /// chunk filenames.
    fn is_chunked(&self, project: &Project) -> bool {
        let chapters = self.base.rc.chapters(&project.identifier);
        if let Some(first) = chapters.first() {
            for chunk in self.base.rc.chunks(&project.identifier, first) {
                if matches!(chunk.as_str(), "title.txt" | "reference.txt" | "01.txt") {
                    return true;
                }
            }
        }
        false
    }
}

impl Preprocess for ObsPreprocessor {
    fn run(&mut self) -> Result<bool, PreprocessError> {
        for project in self.base.rc.projects() {
            let project_path = self.base.project_path(project);

            // Markdown already at the project root passes straight through.
            for name in sorted_files_with_ext(&project_path, "md") {
                let output_path = self.base.output_dir.join(&name);
                if !output_path.exists() && !IGNORE_FILES.contains(&name.as_str()) {
                    copy_file(&project_path.join(&name), &output_path)?;
                }
            }

            if self.is_chunked(project) {
                for chapter in Self::chapters(&project_path) {
                    let mut markdown = format!("# {}\n\n", chapter.title);
                    for frame in &chapter.frames {
                        markdown.push_str(&format!(
                            "![Frame {0}](https://cdn.door43.org/obs/jpg/360px/obs-en-{0}.jpg)\n\n",
                            frame.id
                        ));
                        markdown.push_str(&frame.text);
                        markdown.push_str("\n\n");
                    }
                    markdown.push_str(&format!("_{}_\n", chapter.reference));
                    write_file(
                        &self.base.output_dir.join(format!("{}.md", chapter.id)),
                        &markdown,
                    )?;
                }
            } else {
                for chapter in self.base.rc.chapters(&project.identifier) {
                    let chapter_dir = project_path.join(&chapter);
                    let source = if chapter_dir.join("01.md").is_file() {
                        Some(chapter_dir.join("01.md"))
                    } else if chapter_dir.join("intro.md").is_file() {
                        Some(chapter_dir.join("intro.md"))
                    } else {
                        None
                    };
                    if let Some(source) = source {
                        copy_file(
                            &source,
                            &self.base.output_dir.join(format!("{}.md", chapter)),
                        )?;
                    }
                }
            }
        }
        Ok(true)
    }
}

/// Bible books: one USFM document per book, synthesized from chunks when the
/// repository is not already in USFM form.
pub struct BiblePreprocessor {
    base: Preprocessor,
    books: Vec<String>,
}

impl BiblePreprocessor {
    pub fn new(
        rc: ResourceContainer,
        source_dir: &Path,
        output_dir: &Path,
    ) -> Result<Self, PreprocessError> {
        Ok(Self {
            base: Preprocessor::new(rc, source_dir, output_dir)?,
            books: Vec::new(),
        })
    }

    fn usfm_name(project: &Project, index: usize) -> String {
        match book_number(&project.identifier.to_lowercase()) {
            Some(number) => format!("{}-{}.usfm", number, project.identifier.to_uppercase()),
            None => format!("{:02}-{}.usfm", index + 1, project.identifier.to_uppercase()),
        }
    }
}

impl Preprocess for BiblePreprocessor {
    fn run(&mut self) -> Result<bool, PreprocessError> {
        let rc = self.base.rc.clone();
        for (index, project) in rc.projects().iter().enumerate() {
            let project_path = self.base.project_path(project);

            // Case 1: one file, one book.
            if project_path.is_file() {
                let filename = Self::usfm_name(project, index);
                copy_file(&project_path, &self.base.output_dir.join(&filename))?;
                self.books.push(filename);
                continue;
            }

            // Case 2: a directory of USFM files, one or more books. The book
            // code hides after the last '-' of the filename stem. Every
            // filename is recorded, copied or not, to keep the book count
            // accurate.
            let usfm_files = sorted_files_with_ext(&project_path, "usfm");
            if !usfm_files.is_empty() {
                for name in usfm_files {
                    let stem = Path::new(&name)
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .unwrap_or(&name);
                    let book_code = stem.rsplit('-').next().unwrap_or(stem).to_lowercase();
                    let filename = match book_number(&book_code) {
                        Some(number) => format!("{}-{}.usfm", number, book_code.to_uppercase()),
                        None => format!("{}.usfm", stem),
                    };
                    let output_path = self.base.output_dir.join(&filename);
                    if !output_path.exists() {
                        copy_file(&project_path.join(&name), &output_path)?;
                    }
                    self.books.push(filename);
                }
                continue;
            }

            // Case 3: chapter directories of chunk files, pieced into one
            // USFM document.
            let chapters = rc.chapters(&project.identifier);
            if chapters.is_empty() {
                continue;
            }

            let title_file = project_path.join(&chapters[0]).join("title.txt");
            let mut title = if title_file.is_file() {
                read_text(&title_file)
                    .map(|t| strip_trailing_number(&t))
                    .unwrap_or_default()
            } else {
                project.title.clone()
            };
            if title.is_empty() {
                let root_title = project_path.join("title.txt");
                if root_title.is_file() {
                    title = read_text(&root_title)
                        .unwrap_or_default()
                        .trim()
                        .to_string();
                }
            }

            let mut usfm = format!(
                "\\id {0} {1}\n\\ide UTF-8\n\\h {2}\n\\toc1 {2}\n\\toc2 {2}\n\\mt {2}",
                project.identifier.to_uppercase(),
                rc.resource().title,
                title
            );

            for chapter in &chapters {
                if IGNORE_DIRECTORIES.contains(&chapter.as_str()) {
                    continue;
                }
                let chapter_num = chapter.trim_start_matches('0');
                let chunks = rc.chunks(&project.identifier, chapter);
                if chunks.is_empty() {
                    continue;
                }
                let first_chunk =
                    read_text(&project_path.join(chapter).join(&chunks[0])).unwrap_or_default();
                usfm.push_str("\n\n");
                // Plain substring probe, kept for output compatibility: a
                // chapter number quoted elsewhere in the chunk suppresses
                // the marker.
                if !first_chunk.contains(&format!("\\c {}", chapter_num)) {
                    usfm.push_str(&format!("\\c {}\n", chapter_num));
                }
                let chapter_title_file = project_path.join(chapter).join("title.txt");
                if chapter_title_file.is_file() {
                    if let Some(translated_title) = read_text(&chapter_title_file) {
                        let translated_title = translated_title.trim();
                        let book_name = strip_trailing_number(translated_title);
                        if book_name.to_lowercase() != title.to_lowercase() {
                            usfm.push_str(&format!("\\cl {}\n", translated_title));
                        }
                    }
                }
                for chunk in &chunks {
                    if IGNORE_FILES.contains(&chunk.as_str()) {
                        continue;
                    }
                    let chunk_num = Path::new(chunk)
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .unwrap_or(chunk)
                        .trim_start_matches('0');
                    let Some(chunk_content) = read_text(&project_path.join(chapter).join(chunk))
                    else {
                        continue;
                    };
                    let marker = format!("\\v {} ", chunk_num);
                    if !chunk_content.contains(&marker) {
                        usfm.push_str(&marker);
                    }
                    usfm.push_str(&chunk_content);
                    usfm.push('\n');
                }
            }

            let filename = Self::usfm_name(project, index);
            write_file(&self.base.output_dir.join(&filename), &usfm)?;
            self.books.push(filename);
        }
        debug!(books = ?self.books, "Bible preprocessing produced books");
        Ok(true)
    }

    fn is_multiple_jobs(&self) -> bool {
        self.books.len() > 1
    }

    fn book_list(&self) -> Option<Vec<String>> {
        let mut books = self.books.clone();
        books.sort();
        Some(books)
    }
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// translationAcademy: compiles each manual's table-of-contents tree into
/// one flowing markdown document with local anchors.
pub struct TaPreprocessor {
    base: Preprocessor,
    configs: Vec<ProjectConfig>,
}

impl TaPreprocessor {
    pub fn new(
        rc: ResourceContainer,
        source_dir: &Path,
        output_dir: &Path,
    ) -> Result<Self, PreprocessError> {
        Ok(Self {
            base: Preprocessor::new(rc, source_dir, output_dir)?,
            configs: Vec::new(),
        })
    }

    fn manual_title(identifier: &str) -> String {
        match identifier {
            "checking" => "Checking Manual".to_string(),
            "intro" => "Introduction to translationAcademy".to_string(),
            "process" => "Process Manual".to_string(),
            "translate" => "Translation Manual".to_string(),
            other => format!("{} Manual", title_case(other)),
        }
    }

    fn config_of(&self, project: &Project) -> Option<&ProjectConfig> {
        self.base
            .rc
            .projects()
            .iter()
            .position(|p| p.identifier == project.identifier)
            .and_then(|i| self.configs.get(i))
    }

    fn config_has(&self, project: &Project, link: &str) -> bool {
        self.config_of(project)
            .map(|c| c.contains_key(link))
            .unwrap_or(false)
    }

    /// Title for a slug: the owning project's `title.md`, else the caller's
    /// alternative, else a humanized form of the slug itself.
    fn get_title(&self, project: &Project, link: &str, alt_title: Option<&str>) -> String {
        let owner = if self.config_has(project, link) {
            Some(project)
        } else {
            self.base
                .rc
                .projects()
                .iter()
                .find(|p| self.config_has(p, link))
        };
        if let Some(owner) = owner {
            let title_file = self
                .base
                .source_dir
                .join(&owner.path)
                .join(link)
                .join("title.md");
            if title_file.is_file() {
                if let Some(title) = read_text(&title_file) {
                    return title.trim().to_string();
                }
            }
        }
        match alt_title {
            Some(alt) if !alt.is_empty() => alt.to_string(),
            _ => title_case(&link.replace('-', " ")),
        }
    }

    /// Anchor reference for a slug: local when the slug lives in this
    /// project, cross-manual otherwise.
    fn get_ref(&self, project: &Project, link: &str) -> String {
        if self.config_has(project, link) {
            return format!("#{}", link);
        }
        for p in self.base.rc.projects() {
            if self.config_has(p, link) {
                return format!("{}.html#{}", p.identifier, link);
            }
        }
        format!("#{}", link)
    }

    fn get_question(&self, project: &Project, slug: &str) -> Option<String> {
        let subtitle_file = self
            .base
            .source_dir
            .join(&project.path)
            .join(slug)
            .join("sub-title.md");
        if subtitle_file.is_file() {
            read_text(&subtitle_file).map(|q| q.trim().to_string())
        } else {
            None
        }
    }

    fn get_content(&self, project: &Project, slug: &str) -> Option<String> {
        let content_file = self
            .base
            .source_dir
            .join(&project.path)
            .join(slug)
            .join("01.md");
        if content_file.is_file() {
            read_text(&content_file).map(|c| c.trim_end().to_string())
        } else {
            None
        }
    }

    /// Recursive section markdown creator. Pure container nodes mint a
    /// synthetic anchor from `section_container_id`, which the caller owns
    /// and threads through the whole descent.
    fn compile_section(
        &self,
        project: &Project,
        section: &TocSection,
        level: usize,
        section_container_id: &mut u32,
    ) -> String {
        let link = match &section.link {
            Some(link) => link.clone(),
            None => {
                let link = format!("section-container-{}", section_container_id);
                *section_container_id += 1;
                link
            }
        };
        let mut markdown = format!(
            "{} <a id=\"{}\"/>{}\n\n",
            "#".repeat(level),
            link,
            self.get_title(project, &link, section.title.as_deref())
        );
        if section.link.is_some() {
            let mut top_box = String::new();
            let mut bottom_box = String::new();
            if let Some(question) = self.get_question(project, &link) {
                top_box.push_str(&format!(
                    "This page answers the question: *{}*\n\n",
                    question
                ));
            }
            let entry = self.config_of(project).and_then(|c| c.get(&link)).cloned();
            if let Some(entry) = entry {
                if !entry.dependencies.is_empty() {
                    top_box
                        .push_str("In order to understand this topic, it would be good to read:\n\n");
                    for dependency in &entry.dependencies {
                        top_box.push_str(&format!(
                            "  * *[{}]({})*\n",
                            self.get_title(project, dependency, None),
                            self.get_ref(project, dependency)
                        ));
                    }
                }
                if !entry.recommended.is_empty() {
                    bottom_box.push_str("Next we recommend you learn about:\n\n");
                    for recommended in &entry.recommended {
                        bottom_box.push_str(&format!(
                            "  * *[{}]({})*\n",
                            self.get_title(project, recommended, None),
                            self.get_ref(project, recommended)
                        ));
                    }
                }
            }
            if !top_box.is_empty() {
                markdown.push_str(&format!(
                    "<div class=\"top-box box\" markdown=\"1\">\n{}\n</div>\n\n",
                    top_box
                ));
            }
            if let Some(content) = self.get_content(project, &link) {
                markdown.push_str(&format!("{}\n\n", content));
            }
            if !bottom_box.is_empty() {
                markdown.push_str(&format!(
                    "<div class=\"bottom-box box\" markdown=\"1\">\n{}\n</div>\n\n",
                    bottom_box
                ));
            }
            markdown.push_str("---\n\n");
        }
        for subsection in &section.sections {
            markdown.push_str(&self.compile_section(
                project,
                subsection,
                level + 1,
                section_container_id,
            ));
        }
        markdown
    }

    /// Ordered link-rewrite passes over a compiled manual. Each pass narrows
    /// the pattern space for the next, so the order is load-bearing.
    fn fix_links(&self, content: &str) -> String {
        // rc:// scheme links point at the canonical external repository.
        let mut content = Regex::new(r"(?i)rc://([^/]+)/([^/]+)/([^/]+)/([^\s)\]\n]+)")
            .unwrap()
            .replace_all(
                content,
                "https://git.door43.org/Door43/${1}_${2}/src/master/${4}.md",
            )
            .into_owned();
        // Intra-manual relative links become local anchors:
        // [Section 2](../section2/01.md) -> [Section 2](#section2)
        content = Regex::new(r"\]\(\.\./([^/)]+)/01\.md\)")
            .unwrap()
            .replace_all(&content, "](#$1)")
            .into_owned();
        // Cross-manual relative links become page-and-anchor references:
        // [t](../../translate/accurate/01.md) -> [t](02-translate.html#accurate)
        for (index, project) in self.base.rc.projects().iter().enumerate() {
            let pattern = Regex::new(&format!(
                r"\]\(\.\./\.\./{}/([^/)]+)/01\.md\)",
                regex::escape(&project.identifier)
            ))
            .unwrap();
            let replacement = format!("]({:02}-{}.html#$1)", index + 1, project.identifier);
            content = pattern
                .replace_all(&content, replacement.as_str())
                .into_owned();
        }
        // Bare non-URL link targets become local anchors:
        // [Verbs](figs-verb) -> [Verbs](#figs-verb)
        content = Regex::new(r"\]\(([^# :/)]+)\)")
            .unwrap()
            .replace_all(&content, "](#$1)")
            .into_owned();
        // Auto-link bare URLs not already inside a link.
        content =
            Regex::new(r#"(?i)([^"(])((?:http|https|ftp)://[A-Z0-9/?&_.:=#-]+[A-Z0-9/?&_:=#-])"#)
                .unwrap()
                .replace_all(&content, "$1[$2]($2)")
                .into_owned();
        content = Regex::new(r#"(?i)([^A-Z0-9"(/])(www\.[A-Z0-9/?&_.:=#-]+[A-Z0-9/?&_:=#-])"#)
            .unwrap()
            .replace_all(&content, "$1[$2](http://$2)")
            .into_owned();
        content
    }
}

impl Preprocess for TaPreprocessor {
    fn run(&mut self) -> Result<bool, PreprocessError> {
        self.configs = self
            .base
            .rc
            .projects()
            .iter()
            .map(|p| self.base.rc.project_config(p))
            .collect();
        let rc = self.base.rc.clone();
        for (index, project) in rc.projects().iter().enumerate() {
            let mut section_container_id: u32 = 1;
            let mut markdown = format!("# {}\n\n", Self::manual_title(&project.identifier));
            if let Some(toc) = rc.toc(&project.identifier) {
                for section in &toc.sections {
                    markdown.push_str(&self.compile_section(
                        project,
                        section,
                        2,
                        &mut section_container_id,
                    ));
                }
            }
            let markdown = self.fix_links(&markdown);
            let prefix = format!("{:02}-{}", index + 1, project.identifier);
            write_file(
                &self.base.output_dir.join(format!("{}.md", prefix)),
                &markdown,
            )?;

            // Raw toc and config ride along for downstream ToC rendering.
            let project_path = self.base.project_path(project);
            let toc_file = project_path.join("toc.yaml");
            if toc_file.is_file() {
                copy_file(
                    &toc_file,
                    &self.base.output_dir.join(format!("{}-toc.yaml", prefix)),
                )?;
            }
            let config_file = project_path.join("config.yaml");
            if config_file.is_file() {
                copy_file(
                    &config_file,
                    &self.base.output_dir.join(format!("{}-config.yaml", prefix)),
                )?;
            }
        }
        Ok(true)
    }
}
