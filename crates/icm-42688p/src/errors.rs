/// Errors surfaced by the ICM-42688-P driver.
///
/// `E` is the error type of the register transport in use.
#[derive(derive_more::From, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// The register transport failed.
    Interface(E),
    /// WHO_AM_I did not match the expected identity at bring-up.
    InvalidWhoAmI,
}

impl<E: core::fmt::Display> core::fmt::Display for Error<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Interface(err) => {
                write!(f, "Register interface error: {}", err)
            }
            Error::InvalidWhoAmI => {
                write!(f, "Initialization error: ICM-42688-P not detected")
            }
        }
    }
}
