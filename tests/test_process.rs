use std::fs;

use anyhow::anyhow;
use tar_sample_sort::process::Process;
use tar_sample_sort::sample::Sample;

mod common;

#[test]
fn test_process_keeps_one_class() -> Result<(), anyhow::Error> {
    common::setup();
    let classes: Vec<i64> = (0..500).map(|i| i % 5).collect();
    let mut inputs = Vec::new();
    for i in 0..2 {
        let path = common::temp_file_name("./target/results/");
        common::write_archive(&path, &common::dataset(&format!("p{}-", i), &classes))?;
        inputs.push(path);
    }
    let output_path = common::temp_file_name("./target/results/");

    let mut tar_process = Process::new(inputs.clone(), output_path.clone(), |sample: Sample| {
        Ok(if common::class_of(&sample)? == 3 { Some(sample) } else { None })
    });
    tar_process.with_tasks(4);
    tar_process.with_queue_size(16);
    let stats = tar_process.process()?;
    assert_eq!(stats.processed(), 1000);
    assert_eq!(stats.written(), 200);

    let samples = common::read_samples(&output_path)?;
    assert_eq!(samples.len(), 200);
    for sample in &samples {
        assert_eq!(common::class_of(sample)?, 3);
        assert_eq!(sample.extensions().collect::<Vec<&str>>(), vec!["cls", "txt"]);
    }

    for input in &inputs {
        fs::remove_file(input)?;
    }
    fs::remove_file(output_path)?;
    Ok(())
}

#[test]
fn test_failed_process_leaves_no_output() -> Result<(), anyhow::Error> {
    common::setup();
    let input_path = common::temp_file_name("./target/results/");
    common::write_archive(&input_path, &common::dataset("f", &vec![1; 50]))?;
    let output_path = common::temp_file_name("./target/results/");

    let tar_process = Process::new(vec![input_path.clone()], output_path.clone(), |sample: Sample| {
        if sample.key() == "f00030" {
            return Err(anyhow!("rejected"));
        }
        Ok(Some(sample))
    });
    let result = tar_process.process();
    assert!(format!("{:#}", result.err().ok_or_else(|| anyhow!("expected a failure"))?).contains("f00030"));
    assert!(!output_path.exists());

    fs::remove_file(input_path)?;
    Ok(())
}
