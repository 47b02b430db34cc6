//! versebert - semantic verse retrieval over scripture corpora.
//!
//! A corpus (collections of chapters of verses) is flattened into citable
//! passages, embedded into fixed-dimension vectors, and persisted as a single
//! [redb](https://github.com/cberner/redb) index. A [`Retriever`] loads that
//! index once and answers top-k queries by cosine similarity.
//!
//! # Quick start
//!
//! ```no_run
//! use versebert::{HashEmbedder, Retriever, indexer::{self, BuildOptions}};
//!
//! let index = std::path::Path::new("index.redb");
//! indexer::index_corpus_file(
//!     "kjv.json".as_ref(),
//!     &HashEmbedder::default(),
//!     index,
//!     &BuildOptions::default(),
//! )
//! .unwrap();
//!
//! let retriever = Retriever::open(index, Box::new(HashEmbedder::default())).unwrap();
//! for hit in retriever.query("the good shepherd", 3).unwrap() {
//!     println!("{} ({:.3}) {}", hit.citation(), hit.score, hit.passage.text);
//! }
//! ```

pub mod config_db;
pub mod corpus;
pub mod data_dir;
pub mod embedder_spec;
pub mod embedding;
pub mod error;
pub mod hash_embedder;
pub mod index_db;
pub mod indexer;
pub mod mcp;
pub mod model_manager;
pub mod passage;
pub mod search;

pub use config_db::ConfigDb;
pub use corpus::Corpus;
pub use data_dir::DataDir;
pub use embedder_spec::EmbedderSpec;
pub use embedding::Embedder;
pub use error::{Error, Result};
pub use hash_embedder::HashEmbedder;
pub use index_db::VerseIndex;
pub use model_manager::ModelManager;
pub use passage::{Passage, SourceRef};
pub use search::{Retriever, ScoredPassage};
