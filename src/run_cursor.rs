use std::fs::File;
use std::io::{self, BufReader, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::entry::{Entry, BLOCK_SIZE, parse_header};
use crate::error::{TarError, TarResult};
use crate::key::Key;
use crate::order::Order;
use crate::run_file::{read_bytes, read_exact_len, RunFile};
use crate::sample::Sample;
use crate::sample_record::SampleRecord;

/// Forward-only reader over one spilled run.
///
/// The run is deleted from temporary storage as soon as its last record has been read.
pub(crate) struct RunCursor {
    run: Option<RunFile>,
    reader: BufReader<File>,
    remaining: usize,
    order: Order,
}

impl RunCursor {
    pub(crate) fn new(run: RunFile, order: Order) -> TarResult<RunCursor> {
        let reader = BufReader::new(run.open()?);
        let remaining = run.samples();
        Ok(RunCursor {
            run: Some(run),
            reader,
            remaining,
            order,
        })
    }

    pub(crate) fn next_record(&mut self) -> TarResult<Option<SampleRecord>> {
        if self.remaining == 0 {
            if let Some(run) = self.run.take() {
                log::debug!("Run {} exhausted, removing it", run.seq());
                run.remove()?;
            }
            return Ok(None);
        }
        let record = self.read_record()?;
        self.remaining -= 1;
        Ok(Some(record))
    }

    fn read_record(&mut self) -> TarResult<SampleRecord> {
        let key = String::from_utf8(read_bytes(&mut self.reader)?)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let key_count = self.reader.read_u32::<LittleEndian>()?;
        let mut keys = Vec::new();
        for _ in 0..key_count {
            keys.push(Key::decode(&mut self.reader)?);
        }

        let part_count = self.reader.read_u32::<LittleEndian>()?;
        let mut sample = Sample::new(key);
        for _ in 0..part_count {
            let extension = String::from_utf8(read_bytes(&mut self.reader)?)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            let mut block = [0u8; BLOCK_SIZE];
            self.reader.read_exact(&mut block)?;
            let (header, size) = parse_header(&block, 0).map_err(|e| {
                let seq = self.run.as_ref().map(|run| run.seq()).unwrap_or_default();
                TarError::format(0, format!("corrupted run {}: {}", seq, e))
            })?;
            let data = read_exact_len(&mut self.reader, size)?;
            sample.add_part(extension, Entry::from_parts(header, data))?;
        }
        Ok(SampleRecord::from_parts(sample, keys, self.order.clone()))
    }
}
