mod cursor;
mod headers;
mod palmdoc;
mod reader;

pub use reader::MobiDriver;
