//! Document-to-vector retrieval: page extraction, embedding, an exact L2 index,
//! durable artifacts and ranked k-NN queries.

pub mod config;
pub mod embed;
pub mod error;
pub mod extract;
pub mod index;
pub mod logging;
pub mod page;
pub mod service;
pub mod source;
pub mod store;
pub mod vector_ops;

pub use embed::{Embedder, HashingEmbedder};
pub use error::{ErrorKind, RetrievalError, RetrievalResult};
pub use extract::{PdfExtractor, PlainTextExtractor, TextExtractor};
pub use index::{Neighbor, Vector, VectorIndex};
pub use page::{Page, SearchResponse, SearchResult};
pub use service::{IngestReport, RetrievalService};
pub use store::{Artifact, ArtifactLocator, IndexStore};

#[cfg(feature = "fastembed")]
pub use embed::FastEmbedder;
