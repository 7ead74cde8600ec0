use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::{TarError, TarResult};
use crate::field::Field;
use crate::key::Key;
use crate::order::Order;
use crate::sample::Sample;

/// Caller supplied sort key extraction.
pub type KeyFn = Arc<dyn Fn(&Sample) -> Result<Key, anyhow::Error> + Send + Sync>;

#[derive(Clone)]
pub(crate) enum KeySource {
    Fields(Vec<Field>),
    Function(KeyFn),
}

impl KeySource {
    pub(crate) fn extract(&self, sample: &Sample) -> TarResult<Vec<Key>> {
        match self {
            KeySource::Fields(fields) => {
                let mut keys = Vec::with_capacity(fields.len());
                for field in fields {
                    keys.push(Self::field_key(sample, field)?);
                }
                Ok(keys)
            }
            KeySource::Function(f) => {
                let key = f(sample).map_err(|e| TarError::sort_key(sample.key(), e.to_string()))?;
                Ok(vec![key])
            }
        }
    }

    fn field_key(sample: &Sample, field: &Field) -> TarResult<Key> {
        let text = if field.is_key() {
            sample.key()
        } else {
            let entry = sample.get(field.extension()).ok_or_else(|| {
                TarError::sort_key(sample.key(), format!("missing part '{}'", field.extension()))
            })?;
            std::str::from_utf8(entry.data()).map_err(|e| {
                TarError::sort_key(sample.key(), format!("part '{}' is not UTF-8: {}", field.extension(), e))
            })?
        };
        Key::new(text, field).map_err(|e| {
            let name = if field.name().is_empty() { field.extension() } else { field.name().as_str() };
            TarError::sort_key(sample.key(), format!("field {}: {}", name, e))
        })
    }
}

/// A sample together with its extracted sort keys.
#[derive(Debug)]
pub(crate) struct SampleRecord {
    sample: Sample,
    keys: Vec<Key>,
    order: Order,
}

impl SampleRecord {
    pub(crate) fn new(sample: Sample, key_source: &KeySource, order: Order) -> TarResult<SampleRecord> {
        let keys = key_source.extract(&sample)?;
        Ok(SampleRecord::from_parts(sample, keys, order))
    }

    pub(crate) fn from_parts(sample: Sample, keys: Vec<Key>, order: Order) -> SampleRecord {
        SampleRecord {
            sample,
            keys,
            order,
        }
    }

    pub(crate) fn sample(&self) -> &Sample {
        &self.sample
    }

    pub(crate) fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub(crate) fn into_sample(self) -> Sample {
        self.sample
    }
}

impl Eq for SampleRecord {}

impl PartialEq<Self> for SampleRecord {
    fn eq(&self, other: &Self) -> bool {
        self.keys == other.keys
    }
}

impl PartialOrd<Self> for SampleRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SampleRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        let ordering = self.keys.cmp(&other.keys);
        match &self.order {
            Order::Asc => ordering,
            Order::Desc => ordering.reverse(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;
    use crate::field_type::FieldType;

    fn sample(key: &str, cls: &str) -> Result<Sample, anyhow::Error> {
        let mut sample = Sample::new(key.to_string());
        sample.add_part("cls".to_string(), Entry::new(&format!("{}.cls", key), cls.as_bytes().to_vec())?)?;
        Ok(sample)
    }

    #[test]
    fn test_field_keys() -> Result<(), anyhow::Error> {
        let source = KeySource::Fields(vec![Field::new("cls", FieldType::Integer), Field::key()]);
        let record = SampleRecord::new(sample("b", "3")?, &source, Order::Asc)?;
        assert_eq!(record.keys(), &[Key::integer(3), Key::string("b")]);
        Ok(())
    }

    #[test]
    fn test_missing_part() -> Result<(), anyhow::Error> {
        let source = KeySource::Fields(vec![Field::new("txt", FieldType::String)]);
        let result = SampleRecord::new(sample("b", "3")?, &source, Order::Asc);
        assert!(matches!(result, Err(TarError::SortKey { key, .. }) if key == "b"));
        Ok(())
    }

    #[test]
    fn test_key_function() -> Result<(), anyhow::Error> {
        let source = KeySource::Function(Arc::new(|s: &Sample| {
            Ok::<Key, anyhow::Error>(Key::integer(s.key().len() as i64))
        }));
        let record = SampleRecord::new(sample("abcd", "0")?, &source, Order::Asc)?;
        assert_eq!(record.keys(), &[Key::integer(4)]);
        Ok(())
    }

    #[test]
    fn test_descending_order() -> Result<(), anyhow::Error> {
        let source = KeySource::Fields(vec![Field::new("cls", FieldType::Integer)]);
        let low = SampleRecord::new(sample("a", "1")?, &source, Order::Desc)?;
        let high = SampleRecord::new(sample("b", "2")?, &source, Order::Desc)?;
        assert!(high < low);
        Ok(())
    }
}
