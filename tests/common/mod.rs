use std::fs;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::str::FromStr;

use data_encoding::HEXLOWER;
use simple_logger::SimpleLogger;
use tar_sample_sort::entry::Entry;
use tar_sample_sort::key_policy::KeyPolicy;
use tar_sample_sort::sample::Sample;
use tar_sample_sort::sample_iterator::SampleIterator;
use tar_sample_sort::tar_reader::TarReader;
use tar_sample_sort::tar_writer::TarWriter;

pub fn setup() {
    // several tests of one binary race to install the logger, only the first one wins
    let _ = SimpleLogger::new().with_level(log::LevelFilter::Info).init();

    let results_dir_path = PathBuf::from_str("./target/results/").unwrap();
    if !results_dir_path.exists() {
        fs::create_dir_all(&results_dir_path).unwrap_or_else(|_|
            panic!("Failed to create results directory: {:?}", results_dir_path)
        );
    }
}

#[allow(dead_code)]
pub fn temp_file_name(dir: &str) -> PathBuf {
    let mut result = PathBuf::from(dir);
    let name = HEXLOWER.encode(&rand::random::<[u8; 16]>());
    result.push(name);
    result
}

#[allow(dead_code)]
pub fn temp_dir(dir: &str) -> Result<PathBuf, anyhow::Error> {
    let path = temp_file_name(dir);
    fs::create_dir_all(&path)?;
    Ok(path)
}

/// Write an archive of `(name, payload)` entries.
#[allow(dead_code)]
pub fn write_archive(path: &PathBuf, entries: &[(String, Vec<u8>)]) -> Result<(), anyhow::Error> {
    let mut writer = TarWriter::new(BufWriter::new(File::create(path)?));
    for (name, data) in entries {
        writer.write_entry(&Entry::new(name, data.clone())?)?;
    }
    writer.finish()?;
    Ok(())
}

/// Samples `{prefix}{i:05}` with a `.cls` part holding `classes[i]` and a `.txt` part.
#[allow(dead_code)]
pub fn dataset(prefix: &str, classes: &[i64]) -> Vec<(String, Vec<u8>)> {
    let mut entries = Vec::new();
    for (i, cls) in classes.iter().enumerate() {
        let key = format!("{}{:05}", prefix, i);
        entries.push((format!("{}.cls", key), cls.to_string().into_bytes()));
        entries.push((format!("{}.txt", key), format!("sample {} of class {}", key, cls).into_bytes()));
    }
    entries
}

#[allow(dead_code)]
pub fn read_entries(path: &PathBuf) -> Result<Vec<(String, Vec<u8>)>, anyhow::Error> {
    let reader = TarReader::new(BufReader::new(File::open(path)?));
    let mut entries = Vec::new();
    for entry in reader.entries() {
        let entry = entry?;
        entries.push((entry.name(), entry.into_data()));
    }
    Ok(entries)
}

#[allow(dead_code)]
pub fn read_samples(path: &PathBuf) -> Result<Vec<Sample>, anyhow::Error> {
    let mut samples = Vec::new();
    for sample in SampleIterator::from_reader(BufReader::new(File::open(path)?), KeyPolicy::FirstDot) {
        samples.push(sample?);
    }
    Ok(samples)
}

#[allow(dead_code)]
pub fn read_keys(path: &PathBuf) -> Result<Vec<String>, anyhow::Error> {
    Ok(read_samples(path)?.iter().map(|s| s.key().to_string()).collect())
}

#[allow(dead_code)]
pub fn class_of(sample: &Sample) -> Result<i64, anyhow::Error> {
    let entry = sample
        .get("cls")
        .ok_or_else(|| anyhow::anyhow!("{} has no cls part", sample.key()))?;
    Ok(std::str::from_utf8(entry.data())?.parse()?)
}
