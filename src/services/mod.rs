mod browser;
mod nextcloud;
mod profile;

pub use nextcloud::{ExtractionCause, ExtractionError, ExtractionStep, IdentityExtractor};
