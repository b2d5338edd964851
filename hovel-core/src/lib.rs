pub mod error;
pub mod fs;
pub mod settings;
pub mod tracing_init;
pub mod validation;

pub use error::{HovelError, Result};
pub use settings::Settings;
