use std::fs;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read};

use tar_sample_sort::entry::Entry;
use tar_sample_sort::error::TarError;
use tar_sample_sort::key_policy::KeyPolicy;
use tar_sample_sort::sample_iterator::SampleIterator;
use tar_sample_sort::tar_reader::TarReader;
use tar_sample_sort::tar_writer::TarWriter;

mod common;

#[test]
fn test_rewrite_is_byte_identical() -> Result<(), anyhow::Error> {
    common::setup();
    let input_path = common::temp_file_name("./target/results/");
    let mut entries = common::dataset("s", &[1, 2, 3]);
    entries.push(("empty.bin".to_string(), vec![]));
    entries.push(("block.bin".to_string(), vec![1; 512]));
    entries.push(("odd.bin".to_string(), vec![2; 1025]));
    common::write_archive(&input_path, &entries)?;

    let output_path = common::temp_file_name("./target/results/");
    let mut reader = TarReader::new(BufReader::new(File::open(&input_path)?));
    let mut writer = TarWriter::new(BufWriter::new(File::create(&output_path)?));
    while let Some(entry) = reader.read_entry()? {
        writer.write_entry(&entry)?;
    }
    writer.finish()?;

    assert_eq!(fs::read(&input_path)?, fs::read(&output_path)?);
    fs::remove_file(input_path)?;
    fs::remove_file(output_path)?;
    Ok(())
}

#[test]
fn test_archive_written_by_tar_crate() -> Result<(), anyhow::Error> {
    common::setup();
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in [("a.jpg", &b"jpeg"[..]), ("a.cls", &b"7"[..]), ("b.jpg", &b"jpeg jpeg"[..])] {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o600);
        header.set_cksum();
        builder.append_data(&mut header, name, data)?;
    }
    let archive = builder.into_inner()?;

    let samples: Vec<_> = SampleIterator::from_reader(archive.as_slice(), KeyPolicy::FirstDot)
        .collect::<Result<Vec<_>, TarError>>()?;
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[0].extensions().collect::<Vec<&str>>(), vec!["jpg", "cls"]);
    assert_eq!(samples[0].get("cls").map(|e| e.data().to_vec()), Some(b"7".to_vec()));
    assert_eq!(samples[1].get("jpg").map(|e| e.mode()), Some(Some(0o600)));
    Ok(())
}

#[test]
fn test_streamed_payload() -> Result<(), anyhow::Error> {
    common::setup();
    let mut writer = TarWriter::new(Vec::new());
    writer.write_entry(&Entry::new("big.bin", (0..100_000u32).map(|i| i as u8).collect())?)?;
    let archive = writer.finish()?;

    let mut reader = TarReader::new(archive.as_slice());
    let mut entry = reader.next_entry()?.ok_or_else(|| anyhow::anyhow!("no entry"))?;
    assert_eq!(entry.remaining(), 100_000);
    let mut head = [0u8; 10];
    entry.read_exact(&mut head)?;
    assert_eq!(head, [0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
    assert!(reader.next_entry()?.is_none());
    Ok(())
}

#[test]
fn test_grouping_with_directories() -> Result<(), anyhow::Error> {
    common::setup();
    let mut writer = TarWriter::new(Vec::new());
    for name in ["train/x.y/a.seg.png", "train/x.y/a.jpg", "train/x.y/b.jpg", "test/b.jpg"] {
        writer.write_entry(&Entry::new(name, vec![])?)?;
    }
    let archive = writer.finish()?;

    let mut keys = Vec::new();
    for sample in SampleIterator::from_reader(archive.as_slice(), KeyPolicy::FirstDot) {
        let sample = sample?;
        keys.push((sample.key().to_string(), sample.extensions().map(|e| e.to_string()).collect::<Vec<String>>()));
    }
    assert_eq!(
        keys,
        vec![
            ("train/x.y/a".to_string(), vec!["seg.png".to_string(), "jpg".to_string()]),
            ("train/x.y/b".to_string(), vec!["jpg".to_string()]),
            ("test/b".to_string(), vec!["jpg".to_string()]),
        ]
    );
    Ok(())
}
