use std::fmt::{self, Debug, Formatter};

/// Helper for printing comma-separated items, e.g. the registers in use.
pub struct CommaSeparated<I: IntoIterator, F: Fn() -> I>(pub F) where I::Item: Debug;

impl<I: IntoIterator, F: Fn() -> I> Debug for CommaSeparated<I, F> where I::Item: Debug {
    fn fmt(&self, f: &mut Formatter) -> Result<(), fmt::Error> {
        let mut sep = "";
        f.write_str("[")?;
        for item in self.0() {
            f.write_str(sep)?;
            item.fmt(f)?;
            sep = ", ";
        }
        f.write_str("]")
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn brackets() {
        let v = [1, 2, 3];
        assert_eq!(format!("{:?}", CommaSeparated(|| v.iter())), "[1, 2, 3]");
        assert_eq!(format!("{:?}", CommaSeparated(|| std::iter::empty::<u8>())), "[]");
    }
}
