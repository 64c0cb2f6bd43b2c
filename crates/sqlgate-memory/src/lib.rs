//! # sqlgate retrieval index
//!
//! Long-term context for the conversation engine: past requests, executed
//! SQL and schema documentation, ranked by similarity to a new request.
//!
//! ## Overview
//!
//! [`KeywordIndex`] keeps every document as a set of lower-cased words and
//! scores a query by set cosine similarity, so a score of `1.0` means the
//! same vocabulary and `0.0` means no shared word. The index can be saved to
//! and loaded from a JSON file.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sqlgate_core::RetrievalIndex;
//! use sqlgate_memory::KeywordIndex;
//!
//! # async fn example() -> sqlgate_core::Result<()> {
//! let index = KeywordIndex::with_path("schema_index.json");
//! index.load().await?;
//!
//! index.add_document("Table country: columns code, name, population").await?;
//!
//! for hit in index.search("population of each country", 3).await? {
//!     println!("{:.2} {}", hit.score, hit.text);
//! }
//!
//! index.save().await?;
//! # Ok(())
//! # }
//! ```

mod keyword;

pub use keyword::KeywordIndex;
