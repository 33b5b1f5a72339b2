//! Archive verbs that write new archives.

use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    archive::{Archive, MclList},
    file::Output,
    methodcontext::{MethodContext, MethodContextHash},
    Error, Result,
};

/// Settings for [`merge`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOptions {
    /// Descend into subdirectories of the pattern's directory
    pub recursive: bool,
    /// Drop contexts already written
    pub dedup: bool,
    /// Confirm hash matches with a full structural comparison
    pub legacy_compare: bool,
    /// Write contexts without their compile results
    pub strip_compile_results: bool,
}

impl MergeOptions {
    /// Sets [`MergeOptions::recursive`]
    #[must_use]
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Sets [`MergeOptions::dedup`]
    #[must_use]
    pub fn dedup(mut self, dedup: bool) -> Self {
        self.dedup = dedup;
        self
    }

    /// Sets [`MergeOptions::legacy_compare`]
    #[must_use]
    pub fn legacy_compare(mut self, legacy_compare: bool) -> Self {
        self.legacy_compare = legacy_compare;
        self
    }

    /// Sets [`MergeOptions::strip_compile_results`]
    #[must_use]
    pub fn strip_compile_results(mut self, strip: bool) -> Self {
        self.strip_compile_results = strip;
        self
    }
}

/// What a merge or dedup pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Input files read
    pub files: usize,
    /// Contexts read
    pub read: usize,
    /// Contexts written
    pub written: usize,
    /// Contexts dropped as duplicates
    pub duplicates: usize,
}

/// Remembers which contexts have been written.
///
/// The fast mode trusts the hash. The legacy mode keeps every context it has seen and treats a
/// hash match as a duplicate only if the contexts are also structurally equal.
struct Deduper {
    legacy: bool,
    hashes: FxHashSet<MethodContextHash>,
    contexts: FxHashMap<MethodContextHash, Vec<MethodContext>>,
}

impl Deduper {
    fn new(legacy: bool) -> Self {
        Deduper {
            legacy,
            hashes: FxHashSet::default(),
            contexts: FxHashMap::default(),
        }
    }

    fn is_new(&mut self, bytes: &[u8]) -> Result<bool> {
        let hash = MethodContextHash::of_bytes(bytes);
        if !self.legacy {
            return Ok(self.hashes.insert(hash));
        }

        let mc = MethodContext::from_bytes(bytes)?;
        let seen = self.contexts.entry(hash).or_default();
        if seen.iter().any(|candidate| candidate.equal(&mc)) {
            return Ok(false);
        }
        if !seen.is_empty() {
            log::warn!("Hash collision on {} between different contexts", hash);
        }
        seen.push(mc);
        Ok(true)
    }
}

fn append_archive(
    archive: &Archive,
    output: &mut Output,
    mut dedup: Option<&mut Deduper>,
    thin: bool,
    stats: &mut MergeStats,
) -> Result<()> {
    for entry in archive {
        let entry = entry?;
        stats.read += 1;

        let stripped;
        let bytes = if thin {
            stripped = entry.context()?.to_bytes_thin()?;
            stripped.as_slice()
        } else {
            entry.data
        };

        if let Some(dedup) = dedup.as_deref_mut() {
            if !dedup.is_new(bytes)? {
                stats.duplicates += 1;
                continue;
            }
        }
        output.write_all(bytes)?;
        stats.written += 1;
    }
    Ok(())
}

fn glob_regex(glob: &str) -> Result<Regex> {
    let mut pattern = String::with_capacity(glob.len() + 8);
    pattern.push('^');
    for c in glob.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    pattern.push('$');
    Regex::new(&pattern)
        .map_err(|error| Error::InvalidArgument(format!("Bad file pattern '{glob}': {error}")))
}

fn collect_files(dir: &Path, name: &Regex, recursive: bool, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let path = entry.path();
        if file_type.is_dir() {
            if recursive {
                collect_files(&path, name, recursive, files)?;
            }
        } else if entry
            .file_name()
            .to_str()
            .is_some_and(|file_name| name.is_match(file_name))
        {
            files.push(path);
        }
    }
    Ok(())
}

/// Files matching `pattern`, sorted.
///
/// Wildcards (`*`, `?`) are honored in the file name part only. A pattern naming a directory
/// selects every file in it.
fn matching_files(pattern: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let (dir, glob) = if pattern.is_dir() {
        (pattern.to_path_buf(), "*".to_string())
    } else {
        let Some(glob) = pattern.file_name().and_then(|name| name.to_str()) else {
            return Err(Error::InvalidArgument(format!(
                "Bad file pattern '{}'",
                pattern.display()
            )));
        };
        let dir = match pattern.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        (dir, glob.to_string())
    };

    let name = glob_regex(&glob)?;
    let mut files = Vec::new();
    collect_files(&dir, &name, recursive, &mut files)?;
    files.sort();
    Ok(files)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Rejects writing over an archive that is being read: the input is memory-mapped and
/// truncating it would invalidate the mapping.
fn ensure_distinct(input: &Path, output: &Path) -> Result<()> {
    if same_file(input, output) {
        return Err(Error::InvalidArgument(format!(
            "Output {} is also the input",
            output.display()
        )));
    }
    Ok(())
}

/// Appends the bytes of `file2` to `file1` without parsing either.
///
/// On failure `file1` is truncated back to its original length.
///
/// # Errors
/// I/O failures, or [`Error::InvalidArgument`] if both name the same file.
pub fn concat(file1: impl AsRef<Path>, file2: impl AsRef<Path>) -> Result<u64> {
    let (file1, file2) = (file1.as_ref(), file2.as_ref());
    if same_file(file1, file2) {
        return Err(Error::InvalidArgument(format!(
            "Cannot append {} to itself",
            file1.display()
        )));
    }

    let mut source = File::open(file2)?;
    let mut target = OpenOptions::new().append(true).open(file1)?;
    let original_len = target.metadata()?.len();

    let copied = std::io::copy(&mut source, &mut target)
        .and_then(|copied| target.sync_all().map(|()| copied));
    match copied {
        Ok(copied) => Ok(copied),
        Err(error) => {
            if let Err(restore) = target.set_len(original_len) {
                log::error!(
                    "Could not restore {} to {} bytes: {}",
                    file1.display(),
                    original_len,
                    restore
                );
            }
            Err(Error::FileError(error))
        }
    }
}

/// Concatenates every context of every file matching `pattern` into `output`.
///
/// Files are read in sorted path order. The output file itself is never read, even if it
/// matches the pattern.
///
/// ```rust,no_run
/// use superpmi::archive::{merge, MergeOptions};
///
/// let options = MergeOptions::default().recursive(true).dedup(true);
/// let stats = merge("all.mch", "captures/*.mc", &options)?;
/// assert_eq!(stats.read, stats.written + stats.duplicates);
/// # Ok::<(), superpmi::Error>(())
/// ```
///
/// # Errors
/// [`Error::InvalidArgument`] if nothing matches, I/O failures or damaged inputs. The output
/// file is removed on any error.
pub fn merge(
    output: impl AsRef<Path>,
    pattern: impl AsRef<Path>,
    options: &MergeOptions,
) -> Result<MergeStats> {
    let output_path = output.as_ref();
    let pattern = pattern.as_ref();

    let files: Vec<PathBuf> = matching_files(pattern, options.recursive)?
        .into_iter()
        .filter(|file| !same_file(file, output_path))
        .collect();
    if files.is_empty() {
        return Err(Error::InvalidArgument(format!(
            "No files match '{}'",
            pattern.display()
        )));
    }

    let mut output = Output::create(output_path)?;
    let mut dedup = options.dedup.then(|| Deduper::new(options.legacy_compare));
    let mut stats = MergeStats {
        files: files.len(),
        ..MergeStats::default()
    };

    for file in &files {
        log::debug!("Merging {}", file.display());
        let archive = Archive::open(file)?;
        append_archive(
            &archive,
            &mut output,
            dedup.as_mut(),
            options.strip_compile_results,
            &mut stats,
        )?;
    }
    output.finalize()?;

    log::info!(
        "Merged {} contexts from {} files into {}, {} duplicates dropped",
        stats.written,
        stats.files,
        output_path.display(),
        stats.duplicates
    );
    Ok(stats)
}

fn filter_archive(
    input: &Path,
    output: &Path,
    keep: impl Fn(u32) -> bool,
) -> Result<usize> {
    ensure_distinct(input, output)?;
    let archive = Archive::open(input)?;
    let mut out = Output::create(output)?;
    let mut written = 0;
    for entry in &archive {
        let entry = entry?;
        if keep(entry.number) {
            out.write_all(entry.data)?;
            written += 1;
        }
    }
    out.finalize()?;
    Ok(written)
}

/// Writes the contexts selected by `list` to `output`.
///
/// # Errors
/// [`Error::InvalidArgument`] if `output` is `input`, I/O failures or damaged framing. The
/// output file is removed on any error.
pub fn copy(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    list: &MclList,
) -> Result<usize> {
    let written = filter_archive(input.as_ref(), output.as_ref(), |number| {
        list.contains(number)
    })?;
    if written < list.len() {
        log::warn!(
            "{} of {} selected contexts do not exist in {}",
            list.len() - written,
            list.len(),
            input.as_ref().display()
        );
    }
    Ok(written)
}

/// Writes every context not selected by `list` to `output`.
///
/// # Errors
/// [`Error::InvalidArgument`] if `output` is `input`, I/O failures or damaged framing. The
/// output file is removed on any error.
pub fn strip(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    list: &MclList,
) -> Result<usize> {
    filter_archive(input.as_ref(), output.as_ref(), |number| {
        !list.contains(number)
    })
}

fn chunk_path(prefix: &Path, index: usize) -> PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push(format!("-{index}.mch"));
    PathBuf::from(name)
}

fn write_chunks(
    archive: &Archive,
    chunk_size: usize,
    prefix: &Path,
    list: Option<&MclList>,
    written: &mut Vec<PathBuf>,
) -> Result<()> {
    let mut current: Option<Output> = None;
    let mut in_chunk = 0;

    for entry in archive {
        let entry = entry?;
        if list.is_some_and(|list| !list.contains(entry.number)) {
            continue;
        }

        let mut output = match current.take() {
            Some(output) => output,
            None => {
                let path = chunk_path(prefix, written.len());
                if let Some(input) = archive.path() {
                    ensure_distinct(input, &path)?;
                }
                Output::create(path)?
            }
        };
        output.write_all(entry.data)?;
        in_chunk += 1;

        if in_chunk == chunk_size {
            written.push(output.finalize()?);
            in_chunk = 0;
        } else {
            current = Some(output);
        }
    }

    if let Some(output) = current {
        written.push(output.finalize()?);
    }
    Ok(())
}

/// Splits `input` into archives of at most `chunk_size` contexts named `<prefix>-<n>.mch`,
/// counting from 0. With a `list`, only the selected contexts are distributed.
///
/// # Errors
/// [`Error::InvalidArgument`] for a zero chunk size or a chunk name that is the input, I/O
/// failures or damaged framing. On any error every chunk written so far is removed.
pub fn fracture(
    input: impl AsRef<Path>,
    chunk_size: usize,
    prefix: impl AsRef<Path>,
    list: Option<&MclList>,
) -> Result<Vec<PathBuf>> {
    if chunk_size == 0 {
        return Err(Error::InvalidArgument(
            "Chunk size must be at least 1".to_string(),
        ));
    }

    let archive = Archive::open(input)?;
    let mut written = Vec::new();
    if let Err(error) = write_chunks(&archive, chunk_size, prefix.as_ref(), list, &mut written) {
        for path in &written {
            if let Err(remove) = std::fs::remove_file(path) {
                log::error!("Could not remove {}: {}", path.display(), remove);
            }
        }
        return Err(error);
    }
    Ok(written)
}

/// Copies `input` to `output` keeping only the first of each set of identical contexts.
///
/// With `legacy` set, hash matches are confirmed structurally; with `thin` set, compile results
/// are dropped before comparing and writing.
///
/// # Errors
/// [`Error::InvalidArgument`] if `output` is `input`, I/O failures or damaged inputs. The
/// output file is removed on any error.
pub fn remove_dup(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    legacy: bool,
    thin: bool,
) -> Result<MergeStats> {
    let (input, output) = (input.as_ref(), output.as_ref());
    ensure_distinct(input, output)?;
    let archive = Archive::open(input)?;
    let mut out = Output::create(output)?;
    let mut dedup = Deduper::new(legacy);
    let mut stats = MergeStats {
        files: 1,
        ..MergeStats::default()
    };
    append_archive(&archive, &mut out, Some(&mut dedup), thin, &mut stats)?;
    out.finalize()?;

    log::info!(
        "Kept {} of {} contexts, {} duplicates dropped",
        stats.written,
        stats.read,
        stats.duplicates
    );
    Ok(stats)
}
