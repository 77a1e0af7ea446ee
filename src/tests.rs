use crate::probe::NaturalLayoutOracle;
use crate::TypeSpace;

mod lowering;

/// A space backed by the arithmetic oracle, so tests never need a compiler.
fn natural_space() -> TypeSpace {
    TypeSpace::with_oracle(Box::new(NaturalLayoutOracle))
}
