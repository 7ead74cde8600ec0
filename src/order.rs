/// Sort order. Descending order reverses the key comparison, samples with equal keys keep
/// their input order either way.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}
