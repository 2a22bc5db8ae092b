//! Durable artifacts: one `.vectors` file and one `.meta` file per ingested document.
//!
//! `.vectors` layout (all integers little-endian):
//!
//! ```text
//! magic "RGFYVEC1" | u32 version | u32 dimension | u64 count | count * dimension f32
//! ```
//!
//! `.meta` is a bincode-encoded [`ArtifactMeta`] carrying the model id, the parallel page
//! numbers and texts, and the SHA-256 digest of the `.vectors` file. Both files are
//! written to a temporary sibling and renamed into place, vectors first, so the meta file
//! is the commit record. A reader that races a writer sees a digest or count mismatch and
//! gets [`RetrievalError::CorruptArtifact`] instead of mixed data.

use crate::config::Number;
use crate::error::{RetrievalError, RetrievalResult};
use crate::index::VectorIndex;
use crate::page::Page;
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::mem::size_of;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use tracing::{debug, info};

pub const FORMAT_VERSION: u32 = 1;
const MAGIC: &[u8; 8] = b"RGFYVEC1";
const HEADER_LEN: usize = 8 + 4 + 4 + 8;
const VECTORS_EXT: &str = "vectors";
const META_EXT: &str = "meta";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactMeta {
    pub format_version: u32,
    pub model_id: String,
    pub dimension: u32,
    pub count: u64,
    pub vectors_sha256: String,
    pub page_numbers: Vec<u32>,
    pub texts: Vec<String>,
}

/// Where an artifact lives: the store directory plus its derived name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLocator {
    pub dir: PathBuf,
    pub name: String,
}

impl ArtifactLocator {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
        }
    }

    pub fn vectors_path(&self) -> PathBuf {
        self.dir.join(format!("{}.{VECTORS_EXT}", self.name))
    }

    pub fn meta_path(&self) -> PathBuf {
        self.dir.join(format!("{}.{META_EXT}", self.name))
    }
}

impl fmt::Display for ArtifactLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dir.join(&self.name).display())
    }
}

/// A loaded artifact. `index` position `i` corresponds to `pages[i]`.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub locator: ArtifactLocator,
    pub model_id: String,
    pub index: VectorIndex,
    pub pages: Vec<Page>,
}

impl Artifact {
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.pages.iter().map(|page| page.text.as_str())
    }
}

/// Clones share one save lock, so writers going through the same store never interleave
/// their `.vectors`/`.meta` renames.
#[derive(Debug, Clone)]
pub struct IndexStore {
    root: PathBuf,
    save_lock: Arc<Mutex<()>>,
}

impl IndexStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            save_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn locate(&self, name: &str) -> ArtifactLocator {
        ArtifactLocator::new(&self.root, name)
    }

    /// Accept either a bare artifact name or a path to a `.meta`/`.vectors` file.
    /// An artifact in the store whose name matches `reference` exactly takes precedence.
    pub fn resolve(&self, reference: &str) -> ArtifactLocator {
        let named = self.locate(reference);
        if named.meta_path().exists() {
            return named;
        }

        let path = Path::new(reference);
        let is_artifact_file = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == META_EXT || ext == VECTORS_EXT);

        match (is_artifact_file, path.file_stem()) {
            (true, Some(stem)) => {
                let dir = path
                    .parent()
                    .filter(|parent| !parent.as_os_str().is_empty())
                    .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
                ArtifactLocator::new(dir, stem.to_string_lossy())
            }
            _ => named,
        }
    }

    /// Persist `index` and its parallel `pages` under `name`, replacing any previous
    /// artifact of that name wholesale.
    pub fn save(
        &self,
        name: &str,
        index: &VectorIndex,
        pages: &[Page],
        model_id: &str,
    ) -> RetrievalResult<ArtifactLocator> {
        let locator = self.locate(name);
        if index.len() != pages.len() {
            return Err(RetrievalError::Embedding(format!(
                "refusing to save {} vectors with {} pages",
                index.len(),
                pages.len()
            )));
        }

        fs::create_dir_all(&self.root)?;

        let vectors = encode_vectors(index);
        let digest = format!("{:x}", Sha256::digest(&vectors));

        let meta = ArtifactMeta {
            format_version: FORMAT_VERSION,
            model_id: model_id.to_string(),
            dimension: index.dimension() as u32,
            count: index.len() as u64,
            vectors_sha256: digest,
            page_numbers: pages.iter().map(|page| page.page_number).collect(),
            texts: pages.iter().map(|page| page.text.clone()).collect(),
        };
        let meta_bytes =
            bincode::serialize(&meta).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        {
            let _guard = self.save_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            write_atomically(&self.root, &locator.vectors_path(), &vectors)?;
            write_atomically(&self.root, &locator.meta_path(), &meta_bytes)?;
        }

        info!(
            target: "ragify::store",
            "saved artifact '{}' ({} vectors, dimension {})",
            name,
            index.len(),
            index.dimension()
        );
        Ok(locator)
    }

    pub fn load(&self, locator: &ArtifactLocator) -> RetrievalResult<Artifact> {
        let meta_path = locator.meta_path();
        let meta_bytes = match fs::read(&meta_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(RetrievalError::ArtifactNotFound(meta_path));
            }
            Err(e) => return Err(e.into()),
        };

        let meta: ArtifactMeta = bincode::deserialize(&meta_bytes)
            .map_err(|e| RetrievalError::corrupt(&meta_path, format!("unreadable metadata: {e}")))?;
        check_meta(&meta).map_err(|reason| RetrievalError::corrupt(&meta_path, reason))?;

        let vectors_path = locator.vectors_path();
        let index = read_vectors(&vectors_path, &meta)
            .map_err(|reason| RetrievalError::corrupt(&vectors_path, reason))?;

        let pages = meta
            .page_numbers
            .into_iter()
            .zip(meta.texts)
            .map(|(page_number, text)| Page { page_number, text })
            .collect();

        debug!(
            target: "ragify::store",
            "loaded artifact '{}' ({} vectors)",
            locator.name,
            index.len()
        );
        Ok(Artifact {
            locator: locator.clone(),
            model_id: meta.model_id,
            index,
            pages,
        })
    }

    /// Names of all artifacts with a meta record in the store, sorted.
    pub fn list(&self) -> RetrievalResult<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some(META_EXT) {
                if let Some(stem) = path.file_stem() {
                    names.push(stem.to_string_lossy().into_owned());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn remove(&self, locator: &ArtifactLocator) -> RetrievalResult<()> {
        let meta_path = locator.meta_path();
        match fs::remove_file(&meta_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(RetrievalError::ArtifactNotFound(meta_path));
            }
            Err(e) => return Err(e.into()),
        }
        match fs::remove_file(locator.vectors_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn encode_vectors(index: &VectorIndex) -> Vec<u8> {
    let payload = index.as_flat();
    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len() * size_of::<Number>());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&(index.dimension() as u32).to_le_bytes());
    bytes.extend_from_slice(&(index.len() as u64).to_le_bytes());
    bytes.extend(payload.iter().flat_map(|&num| num.to_le_bytes()));
    bytes
}

fn check_meta(meta: &ArtifactMeta) -> Result<(), String> {
    if meta.format_version != FORMAT_VERSION {
        return Err(format!("unsupported format version {}", meta.format_version));
    }
    if meta.page_numbers.len() != meta.texts.len() {
        return Err(format!(
            "{} page numbers but {} texts",
            meta.page_numbers.len(),
            meta.texts.len()
        ));
    }
    if meta.count != meta.texts.len() as u64 {
        return Err(format!(
            "metadata records {} vectors but {} pages",
            meta.count,
            meta.texts.len()
        ));
    }
    Ok(())
}

fn read_vectors(path: &Path, meta: &ArtifactMeta) -> Result<VectorIndex, String> {
    let file = File::open(path).map_err(|e| format!("cannot open vectors file: {e}"))?;
    let file_len = file
        .metadata()
        .map_err(|e| format!("cannot stat vectors file: {e}"))?
        .len();
    if file_len < HEADER_LEN as u64 {
        return Err(format!("vectors file truncated to {file_len} bytes"));
    }

    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| format!("cannot map vectors file: {e}"))?;

    let digest = format!("{:x}", Sha256::digest(&mmap[..]));
    if digest != meta.vectors_sha256 {
        return Err("vectors digest does not match metadata".to_string());
    }

    if &mmap[..8] != MAGIC {
        return Err("bad magic".to_string());
    }
    let version = read_u32(&mmap[8..12]);
    if version != FORMAT_VERSION {
        return Err(format!("unsupported vectors version {version}"));
    }
    let dimension = read_u32(&mmap[12..16]);
    let count = read_u64(&mmap[16..24]);

    if dimension != meta.dimension {
        return Err(format!(
            "recorded dimension {} but vectors have {dimension}",
            meta.dimension
        ));
    }
    if count != meta.count {
        return Err(format!("recorded {} vectors but file has {count}", meta.count));
    }

    let payload = &mmap[HEADER_LEN..];
    let expected_len = (count as usize)
        .checked_mul(dimension as usize)
        .and_then(|n| n.checked_mul(size_of::<Number>()))
        .ok_or_else(|| "vector count overflows".to_string())?;
    if payload.len() != expected_len {
        return Err(format!(
            "expected {expected_len} payload bytes, found {}",
            payload.len()
        ));
    }

    let data: Vec<Number> = payload
        .chunks_exact(size_of::<Number>())
        .map(|chunk| {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(chunk);
            Number::from_le_bytes(buf)
        })
        .collect();

    VectorIndex::from_flat(dimension as usize, count as usize, data)
        .ok_or_else(|| "vector payload does not match header".to_string())
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

/// Each call writes its own uniquely named temp file in `dir`, so concurrent writers of
/// one artifact never share a temp path.
fn write_atomically(dir: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
