mod reader;

pub use reader::Fb2Driver;
