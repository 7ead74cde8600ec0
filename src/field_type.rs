/// How the text of a sort field is interpreted
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldType {
    /// Compared as a string
    String,
    /// Parsed as a signed 64 bit integer
    Integer,
    /// Parsed as a 64 bit floating point number
    Number,
}
