//! This crate implements streaming tools for tar archives holding training samples, the way
//! [WebDataset](https://github.com/webdataset/webdataset) shards are laid out.
//!
//! A sample is a run of consecutive archive entries sharing one key, for example
//! `000123.jpg`, `000123.cls` and `000123.json`. The crate reads and writes archives entry by
//! entry, groups entries into samples, sorts samples by keys derived from their content with
//! bounded memory, splits a sample stream into shards, concatenates shards back into one
//! archive, optionally reading the inputs concurrently, and passes samples through a user
//! function on a thread pool.
//!
//! Every stage is forward only. Archives of any size can be processed, memory usage is
//! bounded by the configured chunk size of the sort and by the queue size of the parallel
//! concatenation.
//!
//! # Examples
//! ```
//! use std::path::PathBuf;
//! use tar_sample_sort::concat::Concat;
//! use tar_sample_sort::shard_policy::ShardPolicy;
//! use tar_sample_sort::sort::Sort;
//! use tar_sample_sort::split::Split;
//!
//! // shuffle a dataset into 8 shards and merge them back
//! fn reshard(input: PathBuf, dir: PathBuf, tmp: PathBuf) -> Result<(), anyhow::Error> {
//!     let sorted = dir.join("sorted.tar");
//!     let mut tar_sort = Sort::new(vec![input], sorted.clone());
//!     // for large archives provide a dedicated directory for sorted runs, preferably on the
//!     // same file system as the output
//!     tar_sort.with_tmp_dir(tmp);
//!     tar_sort.sort()?;
//!
//!     let mut tar_split = Split::new(vec![sorted], dir.join("shard"));
//!     tar_split.with_policy(ShardPolicy::HashedKey { shards: 8 });
//!     let shards = tar_split.split()?;
//!
//!     let mut tar_concat = Concat::new(shards, dir.join("merged.tar"));
//!     tar_concat.with_tasks(4);
//!     tar_concat.concat()?;
//!     Ok(())
//! }
//! ```
//!

pub(crate) mod config;
pub(crate) mod merger;
pub(crate) mod output_file;
pub(crate) mod run_cursor;
pub(crate) mod run_file;
pub(crate) mod sample_command;
pub(crate) mod sample_record;
pub(crate) mod source_command;

pub mod concat;
pub mod entry;
pub mod error;
pub mod external_sort;
pub mod field;
pub mod field_type;
pub mod key;
pub mod key_policy;
pub mod order;
pub mod process;
pub mod sample;
pub mod sample_iterator;
pub mod shard_policy;
pub mod sort;
pub mod split;
pub mod splitter;
pub mod tar_reader;
pub mod tar_writer;
