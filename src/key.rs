use std::cmp::Ordering;
use std::io::{self, Read, Write};
use std::str::FromStr;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use data_encoding::HEXLOWER;

use crate::field::Field;
use crate::field_type::FieldType;
use crate::run_file::{read_bytes, write_bytes};

const STRING_TAG: u8 = 0;
const INTEGER_TAG: u8 = 1;
const NUMBER_TAG: u8 = 2;

/// A sort key value.
///
/// Keys of the same variant compare by value, NaN sorting before every other number. Keys of
/// different variants compare by variant: strings, then integers, then numbers.
#[derive(Clone, Debug)]
pub enum Key {
    String {
        s: String
    },
    Integer {
        i: i64
    },
    Number {
        n: f64
    },
}

impl Key {
    pub fn string(s: impl Into<String>) -> Key {
        Key::String { s: s.into() }
    }

    pub fn integer(i: i64) -> Key {
        Key::Integer { i }
    }

    pub fn number(n: f64) -> Key {
        Key::Number { n }
    }

    pub(crate) fn new(field: &str, field_def: &Field) -> Result<Key, anyhow::Error> {
        match field_def.field_type() {
            FieldType::String => {
                let mut key = field.to_string();
                if field_def.ignore_blanks() {
                    key = key.trim().to_string();
                }

                if field_def.ignore_case() {
                    key = key.to_uppercase()
                }

                if field_def.random() {
                    key = HEXLOWER.encode(&rand::random::<[u8; 16]>());
                }

                Ok(
                    Key::String {
                        s: key
                    }
                )
            }
            FieldType::Integer => {
                let key = if field_def.random() {
                    rand::random::<i64>()
                } else {
                    i64::from_str(field.trim())?
                };

                Ok(
                    Key::Integer {
                        i: key
                    }
                )
            }
            FieldType::Number => {
                let key = if field_def.random() {
                    rand::random::<f64>()
                } else {
                    f64::from_str(field.trim())?
                };

                Ok(
                    Key::Number {
                        n: key
                    }
                )
            }
        }
    }

    /// Write the binary form used inside run files.
    pub(crate) fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            Key::String { s } => {
                writer.write_u8(STRING_TAG)?;
                write_bytes(writer, s.as_bytes())
            }
            Key::Integer { i } => {
                writer.write_u8(INTEGER_TAG)?;
                writer.write_i64::<LittleEndian>(*i)
            }
            Key::Number { n } => {
                writer.write_u8(NUMBER_TAG)?;
                writer.write_f64::<LittleEndian>(*n)
            }
        }
    }

    pub(crate) fn decode<R: Read>(reader: &mut R) -> io::Result<Key> {
        match reader.read_u8()? {
            STRING_TAG => {
                let s = String::from_utf8(read_bytes(reader)?)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                Ok(Key::String { s })
            }
            INTEGER_TAG => Ok(Key::Integer { i: reader.read_i64::<LittleEndian>()? }),
            NUMBER_TAG => Ok(Key::Number { n: reader.read_f64::<LittleEndian>()? }),
            other => {
                Err(io::Error::new(io::ErrorKind::InvalidData, format!("unknown key tag: {}", other)))
            }
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Key::String { .. } => STRING_TAG,
            Key::Integer { .. } => INTEGER_TAG,
            Key::Number { .. } => NUMBER_TAG,
        }
    }
}

impl Eq for Key {}

impl PartialEq<Self> for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd<Self> for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Key::String { s }, Key::String { s: o }) => { s.as_str().cmp(o.as_str()) }
            (Key::Integer { i }, Key::Integer { i: o }) => { i.cmp(o) }
            (Key::Number { n }, Key::Number { n: o }) => {
                if n.is_nan() && o.is_nan() {
                    Ordering::Equal
                } else if !n.is_nan() && o.is_nan() {
                    Ordering::Greater
                } else if n.is_nan() && !o.is_nan() {
                    Ordering::Less
                } else {
                    n.partial_cmp(o).unwrap_or(Ordering::Equal)
                }
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }
}
