use std::path::PathBuf;

use crate::key_policy::KeyPolicy;
use crate::order::Order;
use crate::sample_record::KeySource;

#[derive(Clone)]
pub(crate) struct Config {
    tmp: PathBuf,
    tmp_prefix: String,
    tmp_suffix: String,
    chunk_size_bytes: u64,
    chunk_size_samples: usize,
    files: usize,
    key_source: KeySource,
    order: Order,
    key_policy: KeyPolicy,
}

impl Config {
    pub(crate) fn new(
        tmp: PathBuf,
        tmp_prefix: String,
        tmp_suffix: String,
        chunk_size_bytes: u64,
        chunk_size_samples: usize,
        files: usize,
        key_source: KeySource,
        order: Order,
        key_policy: KeyPolicy,
    ) -> Config {
        Config {
            tmp,
            tmp_prefix,
            tmp_suffix,
            chunk_size_bytes,
            chunk_size_samples,
            files,
            key_source,
            order,
            key_policy,
        }
    }

    pub(crate) fn tmp(&self) -> &PathBuf {
        &self.tmp
    }

    pub(crate) fn tmp_prefix(&self) -> &String {
        &self.tmp_prefix
    }

    pub(crate) fn tmp_suffix(&self) -> &String {
        &self.tmp_suffix
    }

    pub(crate) fn chunk_size_bytes(&self) -> u64 {
        self.chunk_size_bytes
    }

    pub(crate) fn chunk_size_samples(&self) -> usize {
        self.chunk_size_samples
    }

    pub(crate) fn files(&self) -> usize {
        self.files
    }

    pub(crate) fn key_source(&self) -> &KeySource {
        &self.key_source
    }

    pub(crate) fn order(&self) -> &Order {
        &self.order
    }

    pub(crate) fn key_policy(&self) -> &KeyPolicy {
        &self.key_policy
    }
}
