pub mod convert;
pub mod file_io;
pub(crate) mod time;
