/// Local filesystem listing, gzip JSON-lines reading, and writing.
pub mod fs;
