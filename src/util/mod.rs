mod array_map;
pub use array_map::{ArrayMap, AsUsize};

mod bits;
pub use bits::{Bits32};

mod comma_separated;
pub use comma_separated::{CommaSeparated};
