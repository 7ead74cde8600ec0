use crate::field_type::FieldType;

/// Name of the pseudo extension that selects the sample key itself as the sort field.
pub const KEY_FIELD: &str = "__key__";

/// Defines a sort field of a sample.
///
/// A field reads the UTF-8 payload of the part with the given extension, or the sample key when
/// the extension is [KEY_FIELD].
///
/// # Examples
/// ```
/// // sort by the integer stored in the ".cls" part, ignoring surrounding blanks
/// use tar_sample_sort::field::Field;
/// use tar_sample_sort::field_type::FieldType;
/// let field = Field::new("cls", FieldType::Integer)
///     .with_ignore_blanks(true);
/// assert_eq!(field.extension(), "cls");
/// ```
#[derive(Clone, Debug)]
pub struct Field {
    name: String,
    extension: String,
    field_type: FieldType,
    ignore_blanks: bool,
    ignore_case: bool,
    random: bool,
}

impl Field {
    /// Create a new [Field]
    ///
    /// # Arguments
    /// * `extension` - the extension of the part holding the field value. [KEY_FIELD] uses the
    ///   sample key
    /// * `field_type` - the type of the field. See [FieldType] for supported types
    pub fn new(extension: &str, field_type: FieldType) -> Field {
        Field {
            name: String::new(),
            extension: extension.to_string(),
            field_type,
            ignore_blanks: false,
            ignore_case: false,
            random: false,
        }
    }

    /// A string field over the sample key.
    pub fn key() -> Field {
        Field::new(KEY_FIELD, FieldType::String)
    }

    /// Get the name for this field.
    pub fn name(&self) -> &String {
        &self.name
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn is_key(&self) -> bool {
        self.extension == KEY_FIELD
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    pub fn ignore_blanks(&self) -> bool {
        self.ignore_blanks
    }

    pub fn ignore_case(&self) -> bool {
        self.ignore_case
    }

    pub fn random(&self) -> bool {
        self.random
    }

    /// Specify a name for this field, used in error messages
    pub fn with_name(mut self, name: &str) -> Field {
        self.name = name.to_string();
        self
    }

    pub fn with_extension(mut self, extension: &str) -> Field {
        self.extension = extension.to_string();
        self
    }

    pub fn with_field_type(mut self, field_type: FieldType) -> Field {
        self.field_type = field_type;
        self
    }

    /// Trim the field before comparison.
    pub fn with_ignore_blanks(mut self, ignore_blanks: bool) -> Field {
        self.ignore_blanks = ignore_blanks;
        self
    }

    pub fn with_ignore_case(mut self, ignore_case: bool) -> Field {
        self.ignore_case = ignore_case;
        self
    }

    /// Replace the field value with a random one. Sorting on a random field shuffles the
    /// samples.
    pub fn with_random(mut self, random: bool) -> Field {
        self.random = random;
        self
    }
}
