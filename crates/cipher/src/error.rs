use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
	#[error("unable to generate random bytes")]
	Random,
	#[error("buffer length is not a multiple of the cipher block size")]
	LengthMismatch,
	#[error("invalid key or IV length")]
	InvalidKey,
}

pub type Result<T> = std::result::Result<T, Error>;
