use std::cmp::min;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tempfile::{Builder, NamedTempFile, TempPath};

use crate::config::Config;
use crate::entry::MAX_PREALLOCATION;
use crate::error::TarResult;
use crate::sample_record::SampleRecord;

pub(crate) fn create_tmp_file(dir: &Path, config: &Config) -> TarResult<NamedTempFile> {
    let file = Builder::new()
        .prefix(config.tmp_prefix())
        .suffix(config.tmp_suffix())
        .tempfile_in(dir)?;
    Ok(file)
}

/// A sorted run spilled to temporary storage.
///
/// Each record is laid out as: sample key, sort keys, then every part as extension, raw 512
/// byte header and payload. Lengths and counts are little endian u32. The file is removed when
/// the handle is dropped.
pub(crate) struct RunFile {
    seq: usize,
    path: TempPath,
    samples: usize,
    bytes: u64,
}

impl RunFile {
    pub(crate) fn spill<I>(seq: usize, records: I, dir: &Path, config: &Config) -> TarResult<RunFile>
    where
        I: IntoIterator<Item = TarResult<SampleRecord>>,
    {
        let mut tmp_file = create_tmp_file(dir, config)?;
        let (samples, bytes) = write_records(BufWriter::new(tmp_file.as_file_mut()), records)?;
        let path = tmp_file.into_temp_path();
        log::debug!("Spilled run {}, samples: {}, bytes: {}, path: {}", seq, samples, bytes, path.display());
        Ok(RunFile {
            seq,
            path,
            samples,
            bytes,
        })
    }

    pub(crate) fn seq(&self) -> usize {
        self.seq
    }

    pub(crate) fn samples(&self) -> usize {
        self.samples
    }

    pub(crate) fn bytes(&self) -> u64 {
        self.bytes
    }

    pub(crate) fn open(&self) -> TarResult<File> {
        Ok(File::open(&self.path)?)
    }

    /// Delete the run from temporary storage.
    pub(crate) fn remove(self) -> TarResult<()> {
        self.path.close()?;
        Ok(())
    }

}

/// Write records in run format, returning the number of samples and bytes written.
fn write_records<W, I>(writer: W, records: I) -> TarResult<(usize, u64)>
where
    W: Write,
    I: IntoIterator<Item = TarResult<SampleRecord>>,
{
    let mut writer = CountingWriter::new(writer);
    let mut samples = 0;
    for record in records {
        write_record(&mut writer, &record?)?;
        samples += 1;
    }
    writer.flush()?;
    Ok((samples, writer.count))
}

fn write_record<W: Write>(writer: &mut W, record: &SampleRecord) -> io::Result<()> {
    let sample = record.sample();
    write_bytes(writer, sample.key().as_bytes())?;

    writer.write_u32::<LittleEndian>(record.keys().len() as u32)?;
    for key in record.keys() {
        key.encode(writer)?;
    }

    writer.write_u32::<LittleEndian>(sample.len() as u32)?;
    for (extension, entry) in sample.parts() {
        write_bytes(writer, extension.as_bytes())?;
        writer.write_all(entry.header().as_bytes())?;
        writer.write_all(entry.data())?;
    }
    Ok(())
}

pub(crate) fn write_bytes<W: Write>(writer: &mut W, bytes: &[u8]) -> io::Result<()> {
    writer.write_u32::<LittleEndian>(bytes.len() as u32)?;
    writer.write_all(bytes)
}

pub(crate) fn read_bytes<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let len = reader.read_u32::<LittleEndian>()?;
    read_exact_len(reader, len as u64)
}

/// Read exactly `len` bytes. The buffer grows with the data read, a corrupted length fails
/// with `UnexpectedEof` instead of allocating it up front.
pub(crate) fn read_exact_len<R: Read>(reader: &mut R, len: u64) -> io::Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(min(len, MAX_PREALLOCATION) as usize);
    reader.take(len).read_to_end(&mut bytes)?;
    if (bytes.len() as u64) < len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("expected {} bytes, found {}", len, bytes.len()),
        ));
    }
    Ok(bytes)
}

struct CountingWriter<W: Write> {
    inner: W,
    count: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> CountingWriter<W> {
        CountingWriter { inner, count: 0 }
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
