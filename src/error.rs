use thiserror::Error;

use crate::frontend::ParseError;
use crate::lower::LowerError;
use crate::probe::ProbeError;

/// Any error a type space operation can raise.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Lower(#[from] LowerError),
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error("redefinition of typedef `{0}`")]
    TypedefRedefined(String),
    #[error("redefinition of macro `{0}`")]
    MacroRedefined(String),
}

pub type Result<T> = std::result::Result<T, Error>;
