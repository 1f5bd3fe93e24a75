/// Date, source, and filename parsing for dated source paths.
pub mod date_helpers;
